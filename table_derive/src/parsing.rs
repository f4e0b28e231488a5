//! Parsing of `#[orm(...)]` attributes
//!
//! Struct level: `table = "..."` and `hooks(...)`. Field level: any number of
//! `key` or `key = value` tags, passed through to the schema reflector
//! unchanged, plus the derive-only markers `ignore` and `embedded`.

use syn::{
    spanned::Spanned, Attribute, Data, DeriveInput, Error, Expr, ExprLit, Fields,
    GenericArgument, Ident, Lit, PathArguments, Result, Type,
};

/// Tags that make a field a relation instead of a column
const RELATION_TAGS: &[&str] = &[
    "relation",
    "has_one",
    "has_many",
    "belongs_to",
    "many2many",
    "many_2_many",
    "polymorphic",
    "foreign_key",
    "references",
    "join_foreign_key",
    "join_references",
];

const HOOKS: &[(&str, &str)] = &[
    ("before_save", "BeforeSave"),
    ("before_create", "BeforeCreate"),
    ("before_update", "BeforeUpdate"),
    ("before_delete", "BeforeDelete"),
    ("after_save", "AfterSave"),
    ("after_create", "AfterCreate"),
    ("after_update", "AfterUpdate"),
    ("after_delete", "AfterDelete"),
    ("after_find", "AfterFind"),
    ("after_error", "AfterError"),
];

pub struct ModelInfo {
    pub ident: Ident,
    pub table: Option<String>,
    /// `None` when no `hooks(...)` list was given
    pub hooks: Option<Vec<Ident>>,
    pub members: Vec<Member>,
}

pub struct Member {
    pub ident: Ident,
    pub ty: Type,
    pub tags: Vec<(String, String)>,
    pub kind: MemberKind,
}

pub enum MemberKind {
    Column,
    Embedded,
    Many(Type),
    One(Type),
}

pub fn parse_model(input: &DeriveInput) -> Result<ModelInfo> {
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Model cannot be derived for generic types",
        ));
    }
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(Error::new(
                    input.ident.span(),
                    "Model needs a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new(
                input.ident.span(),
                "Model can only be derived for structs",
            ))
        }
    };

    let (table, hooks) = parse_struct_attributes(&input.attrs)?;

    let mut members = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let tags = parse_tags(&field.attrs)?;
        if tags.iter().any(|(k, _)| k == "ignore") {
            continue;
        }
        if let Some((_, column)) = tags.iter().find(|(k, _)| k == "column") {
            validate_identifier(column)
                .map_err(|e| Error::new(ident.span(), format!("invalid column '{column}': {e}")))?;
        }

        let kind = if tags.iter().any(|(k, _)| k == "embedded") {
            MemberKind::Embedded
        } else if tags.iter().any(|(k, _)| RELATION_TAGS.contains(&k.as_str())) {
            relation_kind(&field.ty)
        } else {
            MemberKind::Column
        };
        members.push(Member {
            ident,
            ty: field.ty.clone(),
            tags,
            kind,
        });
    }

    Ok(ModelInfo {
        ident: input.ident.clone(),
        table,
        hooks,
        members,
    })
}

fn parse_struct_attributes(attrs: &[Attribute]) -> Result<(Option<String>, Option<Vec<Ident>>)> {
    let mut table = None;
    let mut hooks: Option<Vec<Ident>> = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let name: syn::LitStr = meta.value()?.parse()?;
                validate_identifier(&name.value())
                    .map_err(|e| meta.error(format!("invalid table name '{}': {e}", name.value())))?;
                table = Some(name.value());
                Ok(())
            } else if meta.path.is_ident("hooks") {
                let list = hooks.get_or_insert_with(Vec::new);
                meta.parse_nested_meta(|hook| {
                    let name = hook
                        .path
                        .get_ident()
                        .map(|i| i.to_string())
                        .unwrap_or_default();
                    match HOOKS.iter().find(|(key, _)| *key == name) {
                        Some((_, variant)) => {
                            list.push(Ident::new(variant, hook.path.span()));
                            Ok(())
                        }
                        None => Err(hook.error(format!("unknown hook '{name}'"))),
                    }
                })
            } else {
                Err(meta.error("expected `table = \"...\"` or `hooks(...)`"))
            }
        })?;
    }
    Ok((table, hooks))
}

/// Collect `key` and `key = value` pairs from every `#[orm]` on a field
pub fn parse_tags(attrs: &[Attribute]) -> Result<Vec<(String, String)>> {
    let mut tags = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            let key = meta
                .path
                .get_ident()
                .map(|i| i.to_string())
                .ok_or_else(|| meta.error("expected a tag name"))?;
            let value = if meta.input.peek(syn::Token![=]) {
                literal_text(&meta.value()?.parse::<Expr>()?)?
            } else {
                String::new()
            };
            tags.push((key, value));
            Ok(())
        })?;
    }
    Ok(tags)
}

fn literal_text(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => match lit {
            Lit::Str(s) => Ok(s.value()),
            Lit::Int(i) => Ok(i.base10_digits().to_string()),
            Lit::Float(f) => Ok(f.base10_digits().to_string()),
            Lit::Bool(b) => Ok(b.value.to_string()),
            other => Err(Error::new(other.span(), "unsupported tag value")),
        },
        Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Neg(_)) => {
            Ok(format!("-{}", literal_text(&unary.expr)?))
        }
        other => Err(Error::new(other.span(), "tag values must be literals")),
    }
}

/// `Vec<T>` is a to-many relation; `Option<T>`, `Option<Box<T>>`, `Box<T>`
/// and `T` are to-one
fn relation_kind(ty: &Type) -> MemberKind {
    if let Some(inner) = generic_inner(ty, "Vec") {
        return MemberKind::Many(inner.clone());
    }
    let target = generic_inner(ty, "Option").unwrap_or(ty);
    let target = generic_inner(target, "Box").unwrap_or(target);
    MemberKind::One(target.clone())
}

fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// Table and column names end up quoted in SQL, so only the character set
/// is checked here
fn validate_identifier(name: &str) -> std::result::Result<(), String> {
    let first = name.chars().next().ok_or("name cannot be empty")?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err("must start with a letter or underscore".to_string());
    }
    if name.len() > 63 {
        return Err(format!("too long: {} characters (max 63)", name.len()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err("only alphanumeric characters and underscores are allowed".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn tags_keep_declaration_order() {
        let input: DeriveInput = parse_quote! {
            struct User {
                #[orm(primary_key, column = "uid")]
                #[orm(auto_increment_increment = 2, default = -1)]
                id: i64,
            }
        };
        let info = parse_model(&input).unwrap();
        let tags = &info.members[0].tags;
        assert_eq!(
            tags,
            &vec![
                ("primary_key".to_string(), String::new()),
                ("column".to_string(), "uid".to_string()),
                ("auto_increment_increment".to_string(), "2".to_string()),
                ("default".to_string(), "-1".to_string()),
            ]
        );
        assert!(matches!(info.members[0].kind, MemberKind::Column));
    }

    #[test]
    fn relation_targets_are_unwrapped() {
        let input: DeriveInput = parse_quote! {
            struct User {
                #[orm(has_many)]
                pets: Vec<Pet>,
                #[orm(belongs_to)]
                manager: Option<Box<User>>,
                #[orm(has_one, foreign_key = "owner_id")]
                card: Option<CreditCard>,
                #[orm(ignore)]
                cache: String,
            }
        };
        let info = parse_model(&input).unwrap();
        assert_eq!(info.members.len(), 3);
        let targets: Vec<String> = info
            .members
            .iter()
            .map(|m| match &m.kind {
                MemberKind::Many(t) => format!("many {}", quote::quote!(#t)),
                MemberKind::One(t) => format!("one {}", quote::quote!(#t)),
                _ => "column".to_string(),
            })
            .collect();
        assert_eq!(targets, vec!["many Pet", "one User", "one CreditCard"]);
    }

    #[test]
    fn hooks_and_table_are_read_from_the_struct() {
        let input: DeriveInput = parse_quote! {
            #[orm(table = "people", hooks(before_create, after_find))]
            struct User {
                id: i64,
            }
        };
        let info = parse_model(&input).unwrap();
        assert_eq!(info.table.as_deref(), Some("people"));
        let hooks: Vec<String> = info
            .hooks
            .unwrap()
            .iter()
            .map(|h| h.to_string())
            .collect();
        assert_eq!(hooks, vec!["BeforeCreate", "AfterFind"]);
    }

    #[test]
    fn unknown_hooks_are_rejected() {
        let input: DeriveInput = parse_quote! {
            #[orm(hooks(before_launch))]
            struct User { id: i64 }
        };
        assert!(parse_model(&input).is_err());
    }

    #[test]
    fn bad_identifiers_are_rejected() {
        for name in ["", "123table", "user-table", "users; DROP TABLE users; --"] {
            assert!(validate_identifier(name).is_err(), "{name}");
        }
        for name in ["users", "_private", "table123", "public.users"] {
            assert!(validate_identifier(name).is_ok(), "{name}");
        }
    }
}

use crate::parsing::{Member, MemberKind, ModelInfo};
use proc_macro2::TokenStream;
use quote::quote;

/// Expand a parsed struct into its `Model` implementation
pub fn generate_model_impl(info: &ModelInfo) -> TokenStream {
    let ident = &info.ident;
    let name = ident.to_string();

    let table = info.table.as_ref().map(|t| quote! { .table(#t) });
    let members = info.members.iter().map(|m| generate_member(ident, m));

    let hook_set = match &info.hooks {
        Some(hooks) if !hooks.is_empty() => quote! {
            fn hook_set() -> ::statement_core::model::HookSet {
                ::statement_core::model::HookSet::NONE
                    #(.with(::statement_core::model::Hook::#hooks))*
            }
        },
        _ => quote! {},
    };

    // Without a hooks list the type gets the no-op defaults
    let hooks_impl = match &info.hooks {
        None => quote! {
            impl ::statement_core::model::Hooks for #ident {}
        },
        Some(_) => quote! {},
    };

    quote! {
        impl ::statement_core::model::Model for #ident {
            fn definition() -> ::statement_core::schema::ModelDef {
                ::statement_core::schema::ModelDef::new::<Self>(#name)
                    #table
                    #(#members)*
            }

            #hook_set
        }

        #hooks_impl
    }
}

fn generate_member(owner: &syn::Ident, member: &Member) -> TokenStream {
    let field = &member.ident;
    let name = field.to_string();
    let ty = &member.ty;
    let keys = member.tags.iter().map(|(k, _)| k);
    let values = member.tags.iter().map(|(_, v)| v);
    let tags = quote! { &[#((#keys, #values)),*] };
    let get = quote! {
        {
            fn get(m: &#owner) -> &#ty { &m.#field }
            get
        }
    };
    let get_mut = quote! {
        {
            fn get_mut(m: &mut #owner) -> &mut #ty { &mut m.#field }
            get_mut
        }
    };

    match &member.kind {
        MemberKind::Column => quote! {
            .field(::statement_core::schema::FieldDef::new::<Self, #ty>(#name, #tags, #get, #get_mut))
        },
        MemberKind::Embedded => quote! {
            .embedded::<Self, #ty>(#tags, #get, #get_mut)
        },
        MemberKind::Many(target) => quote! {
            .relation(::statement_core::schema::RelationDef::many::<Self, #target>(#name, #tags, #get, #get_mut))
        },
        MemberKind::One(target) => quote! {
            .relation(::statement_core::schema::RelationDef::one::<Self, #target, #ty>(#name, #tags, #get, #get_mut))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_model;
    use syn::parse_quote;

    fn expand(input: syn::DeriveInput) -> String {
        generate_model_impl(&parse_model(&input).unwrap()).to_string()
    }

    #[test]
    fn plain_structs_get_empty_hooks() {
        let out = expand(parse_quote! {
            struct User { id: i64, name: String }
        });
        assert!(out.contains("impl :: statement_core :: model :: Hooks for User { }"));
        assert!(out.contains("FieldDef :: new :: < Self , i64 > (\"id\""));
        assert!(!out.contains("fn hook_set"));
    }

    #[test]
    fn declared_hooks_are_flagged() {
        let out = expand(parse_quote! {
            #[orm(table = "people", hooks(before_save))]
            struct User { id: i64 }
        });
        assert!(out.contains(". table (\"people\")"));
        assert!(out.contains("Hook :: BeforeSave"));
        assert!(!out.contains("Hooks for User"));
    }

    #[test]
    fn relations_name_their_target() {
        let out = expand(parse_quote! {
            struct User {
                id: i64,
                #[orm(belongs_to)]
                company: Option<Company>,
                #[orm(many2many = "user_languages")]
                languages: Vec<Language>,
            }
        });
        assert!(out.contains("RelationDef :: one :: < Self , Company , Option < Company > >"));
        assert!(out.contains("RelationDef :: many :: < Self , Language >"));
        assert!(out.contains("(\"many2many\" , \"user_languages\")"));
    }
}

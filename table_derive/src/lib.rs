//! `#[derive(Model)]` for statement-core record types
//!
//! The derive reads `#[orm(...)]` attributes and emits a
//! `statement_core::model::Model` implementation whose `definition()` lists
//! every column, embedded struct and relation with accessor functions, so the
//! schema reflector never needs runtime reflection.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod model_macro;
mod parsing;

use model_macro::generate_model_impl;
use parsing::parse_model;

/// Derive `Model` for a struct with named fields
///
/// ```rust,ignore
/// use statement_core::prelude::*;
///
/// #[derive(Debug, Clone, Default, Model)]
/// #[orm(table = "users", hooks(before_create))]
/// pub struct User {
///     #[orm(primary_key)]
///     pub id: i64,
///     #[orm(column = "user_name", size = 64)]
///     pub name: String,
///     pub company_id: Option<i64>,
///     #[orm(belongs_to)]
///     pub company: Option<Company>,
///     #[orm(many2many = "user_languages")]
///     pub languages: Vec<Language>,
///     #[orm(embedded, embedded_prefix = "author_")]
///     pub author: Author,
///     #[orm(ignore)]
///     pub scratch: String,
/// }
/// ```
///
/// Field tags are handed to the schema reflector as written. A field is a
/// relation when it carries a relation tag (`has_one`, `has_many`,
/// `belongs_to`, `many2many`, `polymorphic`, `foreign_key`, `references` or
/// the bare `relation`). Without a `hooks(...)` list the derive also supplies
/// an empty `Hooks` implementation; with one, the type implements `Hooks`
/// itself.
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let info = match parse_model(&input) {
        Ok(info) => info,
        Err(e) => return e.to_compile_error().into(),
    };

    #[cfg(feature = "debug-logging")]
    eprintln!(
        "derive(Model) for {}: {} members",
        info.ident,
        info.members.len()
    );

    TokenStream::from(generate_model_impl(&info))
}

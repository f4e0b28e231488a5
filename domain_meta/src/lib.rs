//! Domain metadata for JSON "extra" columns and foreign-key lookups
//!
//! A process-wide [`MetaStore`] publishes a snapshot of every known
//! database: its tables, which fields are foreign keys, which hold JSON
//! documents constrained by [`ExtraRule`]s, and which resolve values through
//! multi-hop lookup paths. Snapshots are rebuilt from [`MetaFetcher`]s and
//! swapped in atomically; readers keep whatever snapshot they loaded.

pub mod checker;
pub mod collection;
pub mod errors;
pub mod fetcher;
pub mod lookup;
pub mod model;

pub use checker::{check_extra, check_value, ExtraRule};
pub use collection::{DbCollection, DbMeta, MetaStore};
pub use errors::DomainError;
pub use fetcher::{MetaFetcher, RefreshReport};
pub use lookup::{LookupHop, LookupPath, MAX_TAG_DEPTH};
pub use model::{DomainField, DomainTable, FieldRole, ForeignRef, FormulaMeta};

/// Struct tag naming the identifier column other tables look up by
pub const TAG_LOOKUP_ID: &str = "lookup_id";
/// Struct tag declaring a lookup path on a column
pub const TAG_LOOKUP_VALUE: &str = "lookup_value";

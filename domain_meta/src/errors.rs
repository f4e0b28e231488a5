//! Domain validation errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Shape-rule violation; the message names the offending path
    #[error("{0}")]
    ExtraMismatch(String),

    #[error("extra value is not a JSON object: {0}")]
    Json(String),

    #[error("lookup tag={tag}, lookup deep={depth}>{max}")]
    LookupTooDeep {
        tag: String,
        depth: usize,
        max: usize,
    },

    #[error("lookup tag={tag}, db={db}, table={table}, field={field} is not a foreign key")]
    LookupNotForeign {
        tag: String,
        db: String,
        table: String,
        field: String,
    },

    #[error("lookup tag={tag}, db={db}, table={table}, field={field}: {reason}")]
    LookupMismatch {
        tag: String,
        db: String,
        table: String,
        field: String,
        reason: String,
    },

    #[error("lookup tag={tag} is empty or malformed")]
    LookupMalformed { tag: String },

    #[error("unknown database {0}")]
    UnknownDatabase(String),

    #[error("unknown table {table} in database {db}")]
    UnknownTable { db: String, table: String },

    #[error("fetcher {name} failed: {reason}")]
    Fetch { name: String, reason: String },
}

//! Error types for cache operations
//!
//! This module defines the errors surfaced by the prepared-statement store.

use thiserror::Error;

/// Cache system errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("statement preparation failed: {0}")]
    Prepare(String),

    #[error("statement preparation was abandoned before completion")]
    Abandoned,

    #[error("statement close failed: {0}")]
    Close(String),

    #[error("statement store is closed")]
    Closed,
}

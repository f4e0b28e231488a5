//! In-process caches for the statement pipeline
//!
//! `ExpirableLru` is a bounded, TTL-scoped LRU with a bucketed background
//! sweep. `StmtStore` layers a prepared-statement cache on top of it where
//! the first caller of a key prepares and concurrent callers wait.

pub mod errors;
pub mod lru;
pub mod prelude;
pub mod stmt_store;

// Re-export centralized config
pub use config::StmtCacheConfig;

pub use errors::CacheError;
pub use lru::{EvictCallback, ExpirableLru, NO_EVICTION_TTL, NUM_BUCKETS};
pub use stmt_store::{PreparedHandle, Stmt, StmtStore};

//! Convenience re-exports for common cache-system usage

pub use crate::errors::CacheError;
pub use crate::lru::{EvictCallback, ExpirableLru};
pub use crate::stmt_store::{PreparedHandle, Stmt, StmtStore};

// Re-export centralized config
pub use config::StmtCacheConfig;

// Common external dependencies
pub use async_trait::async_trait;
pub use tokio;

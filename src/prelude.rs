//! Convenience re-exports for common ormchain usage
//!
//! ```rust
//! use ormchain::prelude::*;
//! ```

pub use crate::core::Orm;
pub use crate::errors::ConnectError;

pub use config::{AppConfig, DatabaseConfig, DomainConfig, OrmConfig, StmtCacheConfig};

pub use statement_core::prelude::*;
pub use statement_core::{Conditions, GeneralResult};

pub use domain_meta::{MetaFetcher, MetaStore};

pub use async_trait::async_trait;
pub use tokio;

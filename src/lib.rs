//! # ormchain
//!
//! An async ORM built around a statement pipeline: records are reflected
//! into schemas, chain methods collect clauses on a statement, and every
//! finisher runs an ordered list of callback stages that render SQL, talk to
//! the pool, scan results and save associations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ormchain::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Model)]
//! pub struct User {
//!     pub id: i64,
//!     pub name: String,
//!     pub age: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orm = Orm::from_env().await?;
//!
//!     let mut user = User { name: "John Doe".into(), age: 30, ..Default::default() };
//!     orm.db().create(&mut user).await?;
//!
//!     let mut adults: Vec<User> = Vec::new();
//!     orm.db().where_("age >= ?", args![18]).order("id").find(&mut adults).await?;
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod prelude;

pub use core::Orm;
pub use errors::{ConnectError, OrmError};

pub use config::{AppConfig, DatabaseConfig, DomainConfig, OrmConfig, StmtCacheConfig};

// Generated code refers to these crates by name
pub use cache_system;
pub use domain_meta;
pub use statement_core;
pub use table_derive;
pub use type_mapping;

pub use async_trait;
pub use sqlx;

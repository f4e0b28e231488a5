//! Error types for the ormchain facade
//!
//! Statement errors come straight from `statement_core`; this module only
//! adds the failures of wiring an engine together.

use thiserror::Error;

pub use statement_core::OrmError;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Database connection error: {0}")]
    DatabaseConnection(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("No connection pool for dialect {0}; use Orm::with_pool")]
    NoDriver(String),

    #[error("Engine setup failed: {0}")]
    Engine(#[from] OrmError),
}

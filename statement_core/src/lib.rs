//! # statement-core
//!
//! Statement pipeline of ormchain: schema reflection, the clause AST, the
//! callback registry and its default stages, sessions, associations and the
//! conditional search helper.
//!
//! ```rust,ignore
//! use statement_core::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Model)]
//! #[orm(hooks(before_create))]
//! pub struct User {
//!     #[orm(primary_key)]
//!     pub id: i64,
//!     pub name: String,
//!     pub age: i32,
//! }
//!
//! impl Hooks for User {
//!     fn before_create(&mut self, _: &Session) -> Result<(), OrmError> {
//!         self.name = self.name.trim().to_string();
//!         Ok(())
//!     }
//! }
//!
//! let db = DbBuilder::new(Arc::new(Postgres), pool).build()?;
//! let mut user = User { name: "jinzhu".into(), age: 18, ..Default::default() };
//! db.clone().create(&mut user).await?;
//!
//! let mut adults = Vec::<User>::new();
//! db.model::<User>()
//!     .where_("age >= ?", args![18])
//!     .order("name")
//!     .find(&mut adults)
//!     .await?;
//! ```

extern crate self as statement_core;

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

pub mod association;
pub mod callbacks;
pub mod cancel;
pub mod clause;
pub mod conditional;
pub mod dialect;
pub mod engine;
pub mod errors;
mod logger;
pub mod model;
pub mod pool;
pub mod schema;
pub mod session;
pub(crate) mod stages;
pub mod statement;

pub use association::Association;
pub use callbacks::{stage, sync_stage, CallbackKind, Callbacks, StageFn};
pub use cancel::CancelToken;
pub use conditional::{Conditional, ConditionalOptions, Conditions, GeneralResult};
pub use dialect::Dialect;
pub use engine::{DbBuilder, Engine};
pub use errors::{DbError, OrmError};
pub use model::{Dest, Destination, Hook, HookSet, Hooks, Model, ModelRef, Record, Row};
pub use pool::{Conn, ConnPool, ExecResult, Rows, TxConn};
pub use schema::{Schema, SchemaCache};
pub use session::{Executed, Session, SessionConfig};
pub use statement::Statement;
pub use type_mapping::Value;

pub mod prelude {
    pub use crate::args;
    pub use crate::clause::{Arg, Column, Expr, OnConflict};
    pub use crate::dialect::{MySql, Postgres, SqlServer, Sqlite};
    pub use crate::{
        Association, CallbackKind, CancelToken, Conditional, ConditionalOptions, DbBuilder,
        Destination, Executed, Hooks, Model, OrmError, Row, Session, SessionConfig, Value,
    };
    pub use std::sync::Arc;
    pub use table_derive::Model;
}

//! Connection pool abstraction
//!
//! Stages talk to the database only through [`ConnPool`] and [`TxConn`].
//! [`postgres::PgConnPool`] backs them with sqlx; [`prepared::PreparedStmtPool`]
//! decorates any pool with the prepared-statement cache.

pub mod postgres;
pub mod prepared;

pub use postgres::PgConnPool;
pub use prepared::PreparedStmtPool;

use crate::errors::DbError;
use async_trait::async_trait;
use std::sync::Arc;
use type_mapping::Value;

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Last generated id, when the driver reports one
    pub last_insert_id: Option<i64>,
}

/// Decoded result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait PreparedStatement: Send + Sync {
    fn sql(&self) -> &str;

    async fn exec(&self, vars: &[Value]) -> Result<ExecResult, DbError>;

    async fn query(&self, vars: &[Value]) -> Result<Rows, DbError>;

    async fn close(&self) -> Result<(), DbError>;
}

#[async_trait]
pub trait ConnPool: Send + Sync {
    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError>;

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError>;

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError>;

    async fn begin(&self) -> Result<Arc<dyn TxConn>, DbError>;

    async fn ping(&self) -> Result<(), DbError> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }
}

/// A connection bound to an open transaction
#[async_trait]
pub trait TxConn: Send + Sync {
    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError>;

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError>;

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError>;

    async fn commit(&self) -> Result<(), DbError>;

    /// Rolling back a finished transaction is a no-op
    async fn rollback(&self) -> Result<(), DbError>;
}

/// Where a statement executes: the pool or an open transaction
#[derive(Clone)]
pub enum Conn {
    Pool(Arc<dyn ConnPool>),
    Tx(Arc<dyn TxConn>),
}

impl Conn {
    pub fn is_tx(&self) -> bool {
        matches!(self, Conn::Tx(_))
    }

    pub async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError> {
        match self {
            Conn::Pool(pool) => pool.exec(sql, vars).await,
            Conn::Tx(tx) => tx.exec(sql, vars).await,
        }
    }

    pub async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError> {
        match self {
            Conn::Pool(pool) => pool.query(sql, vars).await,
            Conn::Tx(tx) => tx.query(sql, vars).await,
        }
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conn::Pool(_) => f.write_str("Conn::Pool"),
            Conn::Tx(_) => f.write_str("Conn::Tx"),
        }
    }
}

//! Prepared-statement mode
//!
//! Routes exec/query through statements cached in a [`StmtStore`] keyed by
//! the rendered SQL. Statements prepared inside a transaction stay local to
//! it and are closed when it ends.

use super::{ConnPool, ExecResult, PreparedStatement, Rows, TxConn};
use crate::errors::DbError;
use async_trait::async_trait;
use cache_system::{CacheError, PreparedHandle, StmtCacheConfig, StmtStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use type_mapping::Value;

/// Cache entry wrapping a driver statement
pub struct CachedStmt(Arc<dyn PreparedStatement>);

#[async_trait]
impl PreparedHandle for CachedStmt {
    async fn close(&self) -> Result<(), CacheError> {
        self.0
            .close()
            .await
            .map_err(|e| CacheError::Close(e.to_string()))
    }
}

pub struct PreparedStmtPool {
    inner: Arc<dyn ConnPool>,
    store: StmtStore<CachedStmt>,
}

impl PreparedStmtPool {
    pub fn new(inner: Arc<dyn ConnPool>, config: &StmtCacheConfig) -> Self {
        Self {
            inner,
            store: StmtStore::from_config(config),
        }
    }

    /// SQL texts currently cached, oldest first
    pub fn cached(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn reset(&self) {
        self.store.reset();
    }

    async fn statement(&self, sql: &str) -> Result<Arc<CachedStmt>, DbError> {
        let inner = Arc::clone(&self.inner);
        let key = sql.to_string();
        let stmt = self
            .store
            .get_or_prepare(sql, false, move || async move {
                inner
                    .prepare(&key)
                    .await
                    .map(CachedStmt)
                    .map_err(|e| e.to_string())
            })
            .await?;
        Ok(stmt)
    }
}

#[async_trait]
impl ConnPool for PreparedStmtPool {
    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError> {
        self.statement(sql).await?.0.exec(vars).await
    }

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError> {
        self.statement(sql).await?.0.query(vars).await
    }

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError> {
        Ok(Arc::clone(&self.statement(sql).await?.0))
    }

    async fn begin(&self) -> Result<Arc<dyn TxConn>, DbError> {
        let tx = self.inner.begin().await?;
        Ok(Arc::new(PreparedTx {
            tx,
            statements: Mutex::new(HashMap::new()),
        }))
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.inner.ping().await
    }
}

struct PreparedTx {
    tx: Arc<dyn TxConn>,
    statements: Mutex<HashMap<String, Arc<dyn PreparedStatement>>>,
}

impl PreparedTx {
    async fn statement(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError> {
        let mut statements = self.statements.lock().await;
        if let Some(stmt) = statements.get(sql) {
            return Ok(Arc::clone(stmt));
        }
        let stmt = self.tx.prepare(sql).await?;
        statements.insert(sql.to_string(), Arc::clone(&stmt));
        Ok(stmt)
    }

    async fn close_all(&self) {
        let statements: Vec<_> = self.statements.lock().await.drain().collect();
        for (sql, stmt) in statements {
            if let Err(e) = stmt.close().await {
                tracing::warn!("failed to close prepared statement {:?}: {}", sql, e);
            }
        }
    }
}

#[async_trait]
impl TxConn for PreparedTx {
    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError> {
        self.statement(sql).await?.exec(vars).await
    }

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError> {
        self.statement(sql).await?.query(vars).await
    }

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError> {
        self.statement(sql).await
    }

    async fn commit(&self) -> Result<(), DbError> {
        self.close_all().await;
        self.tx.commit().await
    }

    async fn rollback(&self) -> Result<(), DbError> {
        self.close_all().await;
        self.tx.rollback().await
    }
}

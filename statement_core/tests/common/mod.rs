//! Recording connection pool and shared record types for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use statement_core::errors::DbError;
use statement_core::pool::{ConnPool, ExecResult, PreparedStatement, Rows, TxConn};
use statement_core::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One round trip the pool saw
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Exec(String, Vec<Value>),
    Query(String, Vec<Value>),
    Prepare(String),
    Close(String),
    Begin,
    Commit,
    Rollback,
}

/// Scripted answer for the next exec or query
pub enum Reply {
    Exec(ExecResult),
    Rows(Rows),
    Fail(DbError),
    /// Never answers; used to exercise cancellation
    Hang,
}

#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<VecDeque<Reply>>,
}

impl Recorder {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(&self) -> Option<Reply> {
        self.replies.lock().unwrap().pop_front()
    }

    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError> {
        self.record(Call::Exec(sql.to_string(), vars.to_vec()));
        match self.next() {
            Some(Reply::Exec(result)) => Ok(result),
            Some(Reply::Rows(rows)) => Ok(ExecResult {
                rows_affected: rows.len() as u64,
                last_insert_id: None,
            }),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(ExecResult {
                rows_affected: 1,
                last_insert_id: None,
            }),
        }
    }

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError> {
        self.record(Call::Query(sql.to_string(), vars.to_vec()));
        match self.next() {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Exec(_)) | None => Ok(Rows::default()),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => std::future::pending().await,
        }
    }
}

/// Pool that records every call and answers from a script
#[derive(Clone, Default)]
pub struct MockPool {
    state: Arc<Recorder>,
}

impl MockPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.state.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn rows(&self, columns: &[&str], rows: Vec<Vec<Value>>) -> &Self {
        self.reply(Reply::Rows(Rows::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows,
        )))
    }

    pub fn affected(&self, rows_affected: u64) -> &Self {
        self.reply(Reply::Exec(ExecResult {
            rows_affected,
            last_insert_id: None,
        }))
    }

    pub fn inserted(&self, rows_affected: u64, last_insert_id: i64) -> &Self {
        self.reply(Reply::Exec(ExecResult {
            rows_affected,
            last_insert_id: Some(last_insert_id),
        }))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Statements only, without transaction and prepare bookkeeping
    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Exec(sql, vars) | Call::Query(sql, vars) => Some((sql, vars)),
                _ => None,
            })
            .collect()
    }

    pub fn sqls(&self) -> Vec<String> {
        self.statements().into_iter().map(|(sql, _)| sql).collect()
    }

    pub fn clear(&self) {
        self.state.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl ConnPool for MockPool {
    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError> {
        self.state.exec(sql, vars).await
    }

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError> {
        self.state.query(sql, vars).await
    }

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError> {
        self.state.record(Call::Prepare(sql.to_string()));
        Ok(Arc::new(MockStmt {
            sql: sql.to_string(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn begin(&self) -> Result<Arc<dyn TxConn>, DbError> {
        self.state.record(Call::Begin);
        Ok(Arc::new(MockTx {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTx {
    state: Arc<Recorder>,
}

#[async_trait]
impl TxConn for MockTx {
    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError> {
        self.state.exec(sql, vars).await
    }

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError> {
        self.state.query(sql, vars).await
    }

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError> {
        self.state.record(Call::Prepare(sql.to_string()));
        Ok(Arc::new(MockStmt {
            sql: sql.to_string(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn commit(&self) -> Result<(), DbError> {
        self.state.record(Call::Commit);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DbError> {
        self.state.record(Call::Rollback);
        Ok(())
    }
}

struct MockStmt {
    sql: String,
    state: Arc<Recorder>,
}

#[async_trait]
impl PreparedStatement for MockStmt {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn exec(&self, vars: &[Value]) -> Result<ExecResult, DbError> {
        self.state.exec(&self.sql, vars).await
    }

    async fn query(&self, vars: &[Value]) -> Result<Rows, DbError> {
        self.state.query(&self.sql, vars).await
    }

    async fn close(&self) -> Result<(), DbError> {
        self.state.record(Call::Close(self.sql.clone()));
        Ok(())
    }
}

pub fn mysql(pool: &MockPool) -> Session {
    DbBuilder::new(Arc::new(MySql), Arc::new(pool.clone()))
        .build()
        .unwrap()
}

pub fn postgres(pool: &MockPool) -> Session {
    DbBuilder::new(Arc::new(Postgres), Arc::new(pool.clone()))
        .build()
        .unwrap()
}

pub fn with_config(pool: &MockPool, config: config::OrmConfig) -> Session {
    DbBuilder::new(Arc::new(MySql), Arc::new(pool.clone()))
        .config(config)
        .build()
        .unwrap()
}

/// Every rendered statement binds exactly as many variables as it has markers
pub fn assert_markers_match(pool: &MockPool) {
    for (sql, vars) in pool.statements() {
        assert_eq!(sql.matches('?').count(), vars.len(), "markers in {sql:?}");
    }
}

// ========================================
// Records
// ========================================

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Pet {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Language {
    pub id: i64,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub company_id: Option<i64>,
    #[orm(belongs_to)]
    pub company: Option<Company>,
    pub manager_id: Option<i64>,
    #[orm(belongs_to, foreign_key = "manager_id")]
    pub manager: Option<Box<User>>,
    #[orm(has_many)]
    pub pets: Vec<Pet>,
    #[orm(many2many = "user_languages")]
    pub languages: Vec<Language>,
}

impl User {
    pub fn named(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

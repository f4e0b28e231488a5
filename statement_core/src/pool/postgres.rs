//! sqlx-backed PostgreSQL pool

use super::{ConnPool, ExecResult, PreparedStatement, Rows, TxConn};
use crate::errors::DbError;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, Transaction, TypeInfo};
use std::sync::Arc;
use tokio::sync::Mutex;
use type_mapping::{value_to_json, Value};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(v) => query.bind(*v),
        Value::UInt(v) => match i64::try_from(*v) {
            Ok(v) => query.bind(v),
            Err(_) => query.bind(v.to_string()),
        },
        Value::Float(v) => query.bind(*v),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Time(t) => query.bind(*t),
        Value::Uuid(u) => query.bind(*u),
        Value::Json(j) => query.bind(sqlx::types::Json(j.clone())),
        array @ Value::Array(_) => query.bind(sqlx::types::Json(value_to_json(array))),
    }
}

fn build_query<'q>(sql: &'q str, vars: &[Value]) -> PgQuery<'q> {
    vars.iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

fn decode_column(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
    let type_name = row.column(idx).type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| Value::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| Value::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| Value::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(Value::Time),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
            .map(|v| Value::Time(v.and_utc())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|v| Value::Time(v.and_utc())),
        "UUID" => row.try_get::<Option<uuid::Uuid>, _>(idx)?.map(Value::Uuid),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(Value::Json),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(Value::Bytes),
        // text-like and anything without a dedicated decoder
        _ => row.try_get::<Option<String>, _>(idx).ok().flatten().map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_rows(rows: Vec<PgRow>) -> Result<Rows, DbError> {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let decoded = rows
        .iter()
        .map(|row| {
            (0..row.columns().len())
                .map(|idx| decode_column(row, idx))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Rows::new(columns, decoded))
}

/// PostgreSQL pool; generated ids come back through RETURNING, so
/// `last_insert_id` is never set
#[derive(Debug, Clone)]
pub struct PgConnPool {
    pool: PgPool,
}

impl PgConnPool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnPool for PgConnPool {
    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError> {
        let result = build_query(sql, vars).execute(&self.pool).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError> {
        let rows = build_query(sql, vars).fetch_all(&self.pool).await?;
        decode_rows(rows)
    }

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError> {
        Ok(Arc::new(PgPrepared {
            pool: self.pool.clone(),
            sql: sql.to_string(),
        }))
    }

    async fn begin(&self) -> Result<Arc<dyn TxConn>, DbError> {
        let tx = self.pool.begin().await?;
        Ok(Arc::new(PgTx {
            tx: Arc::new(Mutex::new(Some(tx))),
        }))
    }
}

/// Persistent statement; sqlx keeps the server-side handle per connection
struct PgPrepared {
    pool: PgPool,
    sql: String,
}

#[async_trait]
impl PreparedStatement for PgPrepared {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn exec(&self, vars: &[Value]) -> Result<ExecResult, DbError> {
        let result = build_query(&self.sql, vars)
            .persistent(true)
            .execute(&self.pool)
            .await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn query(&self, vars: &[Value]) -> Result<Rows, DbError> {
        let rows = build_query(&self.sql, vars)
            .persistent(true)
            .fetch_all(&self.pool)
            .await?;
        decode_rows(rows)
    }

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}

type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

struct PgTx {
    tx: SharedTx,
}

fn closed() -> DbError {
    DbError::new("transaction has already been committed or rolled back")
}

async fn tx_exec(tx: &SharedTx, sql: &str, vars: &[Value], persistent: bool) -> Result<ExecResult, DbError> {
    let mut guard = tx.lock().await;
    let conn = guard.as_mut().ok_or_else(closed)?;
    let result = build_query(sql, vars)
        .persistent(persistent)
        .execute(&mut **conn)
        .await?;
    Ok(ExecResult {
        rows_affected: result.rows_affected(),
        last_insert_id: None,
    })
}

async fn tx_query(tx: &SharedTx, sql: &str, vars: &[Value], persistent: bool) -> Result<Rows, DbError> {
    let mut guard = tx.lock().await;
    let conn = guard.as_mut().ok_or_else(closed)?;
    let rows = build_query(sql, vars)
        .persistent(persistent)
        .fetch_all(&mut **conn)
        .await?;
    decode_rows(rows)
}

#[async_trait]
impl TxConn for PgTx {
    async fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult, DbError> {
        tx_exec(&self.tx, sql, vars, false).await
    }

    async fn query(&self, sql: &str, vars: &[Value]) -> Result<Rows, DbError> {
        tx_query(&self.tx, sql, vars, false).await
    }

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError> {
        Ok(Arc::new(PgTxPrepared {
            tx: Arc::clone(&self.tx),
            sql: sql.to_string(),
        }))
    }

    async fn commit(&self) -> Result<(), DbError> {
        let tx = self.tx.lock().await.take().ok_or_else(closed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DbError> {
        let pending = self.tx.lock().await.take();
        if let Some(tx) = pending {
            tx.rollback().await?;
        }
        Ok(())
    }
}

/// Statement prepared on the transaction's connection
struct PgTxPrepared {
    tx: SharedTx,
    sql: String,
}

#[async_trait]
impl PreparedStatement for PgTxPrepared {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn exec(&self, vars: &[Value]) -> Result<ExecResult, DbError> {
        tx_exec(&self.tx, &self.sql, vars, true).await
    }

    async fn query(&self, vars: &[Value]) -> Result<Rows, DbError> {
        tx_query(&self.tx, &self.sql, vars, true).await
    }

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}

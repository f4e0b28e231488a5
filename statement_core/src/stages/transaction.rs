//! Default transaction bracket around create, update and delete chains

use super::hooks;
use crate::pool::Conn;
use crate::statement::Statement;
use futures::future::BoxFuture;
use std::sync::Arc;

pub(crate) fn begin(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if stmt.error.is_some() || stmt.flags.dry_run || stmt.conn.is_tx() {
            return;
        }
        let Conn::Pool(pool) = stmt.conn.clone() else {
            return;
        };
        match pool.begin().await {
            Ok(tx) => {
                stmt.conn = Conn::Tx(tx);
                stmt.started_tx = true;
            }
            Err(err) => {
                let err = stmt.translate(err);
                stmt.add_error(err);
            }
        }
    })
}

/// Runs even after a failure: commits on success, rolls back otherwise
pub(crate) fn commit_or_rollback(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        hooks::after_error(stmt);
        if !stmt.started_tx {
            return;
        }
        stmt.started_tx = false;
        let Conn::Tx(tx) = std::mem::replace(&mut stmt.conn, Conn::Pool(Arc::clone(&stmt.engine.pool)))
        else {
            return;
        };
        if stmt.error.is_none() {
            if let Err(err) = tx.commit().await {
                let err = stmt.translate(err);
                stmt.add_error(err);
            }
        } else if let Err(err) = tx.rollback().await {
            tracing::warn!("rollback after failed statement: {}", err);
        }
    })
}

//! Row and raw stages: statements whose result goes back to the caller as
//! plain rows or a row count

use super::query;
use crate::statement::Statement;
use futures::future::BoxFuture;

pub(crate) fn row(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if stmt.error.is_some() {
            return;
        }
        if stmt.sql.is_empty() {
            if let Err(err) = query::build_query(stmt) {
                stmt.add_error(err);
                return;
            }
        }
        if stmt.error.is_some() || stmt.flags.dry_run {
            return;
        }
        match stmt.query_sql().await {
            Ok(mut rows) => {
                if !stmt.flags.many_rows {
                    rows.rows.truncate(1);
                }
                stmt.rows_affected = rows.len() as u64;
                stmt.rows = Some(rows);
            }
            Err(err) => stmt.add_error(err),
        }
    })
}

pub(crate) fn raw(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if stmt.error.is_some() || stmt.flags.dry_run {
            return;
        }
        match stmt.exec_sql().await {
            Ok(result) => stmt.rows_affected = result.rows_affected,
            Err(err) => stmt.add_error(err),
        }
    })
}

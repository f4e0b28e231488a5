//! Delete stage
//!
//! Schemas with a soft-delete field turn the DELETE into
//! `UPDATE .. SET deleted_at = now WHERE .. AND deleted_at IS NULL` unless the
//! statement is unscoped.

use super::helper;
use crate::clause::{Assignment, Column, Delete, From, Set, Update, Where, DELETE_CLAUSES, UPDATE_CLAUSES};
use crate::errors::OrmError;
use crate::schema::{ClauseHook, Field, TimeUnit};
use crate::statement::Statement;
use futures::future::BoxFuture;
use std::sync::Arc;
use type_mapping::Value;

pub(crate) fn delete(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if stmt.error.is_some() {
            return;
        }
        if stmt.sql.is_empty() {
            if let Err(err) = prepare(stmt) {
                stmt.add_error(err);
                return;
            }
        }
        if stmt.error.is_some() || stmt.flags.dry_run {
            return;
        }
        match stmt.exec_sql().await {
            Ok(result) => stmt.rows_affected = result.rows_affected,
            Err(err) => stmt.add_error(err),
        }
    })
}

fn prepare(stmt: &mut Statement) -> Result<(), OrmError> {
    if stmt.schema.is_some() {
        if let Some(condition) = helper::primary_conditions(stmt) {
            stmt.add_clause(Where::new(vec![condition]));
        }
    }
    helper::guard_global_update(stmt)?;

    let soft_delete = match (&stmt.schema, stmt.flags.unscoped) {
        (Some(schema), false) => schema.delete_clauses.iter().find_map(|hook| match hook {
            ClauseHook::SoftDelete { field } => Some(Arc::clone(field)),
        }),
        _ => None,
    };
    if let Some(field) = soft_delete {
        return soft_delete_update(stmt, &field);
    }

    stmt.add_clause_if_not_exists(Delete::default());
    stmt.add_clause_if_not_exists(From::default());
    stmt.build(DELETE_CLAUSES);
    Ok(())
}

fn soft_delete_update(stmt: &mut Statement, field: &Field) -> Result<(), OrmError> {
    let now = if field.data_kind.is_integer() {
        TimeUnit::Seconds.now()
    } else {
        Value::Time(chrono::Utc::now())
    };
    for record in stmt.dest.record_muts() {
        field.set(record, now.clone())?;
    }
    stmt.add_clause_if_not_exists(Update::default());
    stmt.add_clause(Set::new(vec![Assignment::new(
        Column::new(field.db_name.as_str()),
        now,
    )]));
    if let Some(schema) = stmt.schema.clone() {
        helper::scope_soft_delete(stmt, &schema.delete_clauses);
    }
    stmt.build(UPDATE_CLAUSES);
    Ok(())
}

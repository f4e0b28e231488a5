//! Update stage
//!
//! Builds `UPDATE .. SET .. WHERE ..` from the statement's assignments. Values
//! are written back into the destination records, including the refreshed
//! `updated_at`, and the records' primary keys become the WHERE condition.

use super::{helper, scan};
use crate::clause::{Arg, Assignment, Column, Set, Update, Where, UPDATE_CLAUSES};
use crate::errors::OrmError;
use crate::model::Dest;
use crate::schema::Schema;
use crate::statement::{Assignments, Statement};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Default the assignments of a record update and validate select/omit
pub(crate) fn setup_reflect_value(stmt: &mut Statement) {
    if stmt.error.is_some() {
        return;
    }
    if stmt.assignments == Assignments::None && stmt.dest.has_records() {
        stmt.assignments = Assignments::Record { skip_zero: true };
    }
    if let Err(err) = stmt.check_select_omit() {
        stmt.add_error(err);
    }
}

pub(crate) fn update(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if stmt.error.is_some() {
            return;
        }
        if stmt.sql.is_empty() {
            match prepare(stmt) {
                Ok(true) => stmt.build(UPDATE_CLAUSES),
                Ok(false) => return,
                Err(err) => {
                    stmt.add_error(err);
                    return;
                }
            }
        }
        if stmt.error.is_some() || stmt.flags.dry_run {
            return;
        }

        if stmt.clauses.contains_key("RETURNING") && stmt.engine.dialect.supports_returning() {
            match stmt.query_sql().await {
                Ok(rows) => {
                    let raise = std::mem::replace(&mut stmt.flags.raise_not_found, false);
                    if let Err(err) = scan::scan_rows(stmt, &rows) {
                        stmt.add_error(err);
                    }
                    stmt.flags.raise_not_found = raise;
                }
                Err(err) => stmt.add_error(err),
            }
            return;
        }
        match stmt.exec_sql().await {
            Ok(result) => stmt.rows_affected = result.rows_affected,
            Err(err) => stmt.add_error(err),
        }
    })
}

/// Register UPDATE, SET and WHERE; false when there is nothing to set
fn prepare(stmt: &mut Statement) -> Result<bool, OrmError> {
    let assignments = match stmt.schema.clone() {
        Some(schema) => assignments_for(stmt, &schema)?,
        None => plain_assignments(stmt)?,
    };
    if assignments.is_empty() {
        return Ok(false);
    }

    stmt.add_clause_if_not_exists(Update::default());
    stmt.add_clause(Set::new(assignments));
    if let Some(condition) = helper::primary_conditions(stmt) {
        stmt.add_clause(Where::new(vec![condition]));
    }
    helper::guard_global_update(stmt)?;
    if let Some(schema) = stmt.schema.clone() {
        helper::scope_soft_delete(stmt, &schema.update_clauses);
    }
    Ok(true)
}

/// Table-only updates: keys are column names as given
fn plain_assignments(stmt: &Statement) -> Result<Vec<Assignment>, OrmError> {
    match &stmt.assignments {
        Assignments::Columns(columns) => Ok(columns
            .iter()
            .map(|(key, value)| Assignment::new(Column::new(key.as_str()), value.clone()))
            .collect()),
        _ => Err(OrmError::user("update without a model needs column values")),
    }
}

fn assignments_for(stmt: &mut Statement, schema: &Arc<Schema>) -> Result<Vec<Assignment>, OrmError> {
    match stmt.assignments.clone() {
        Assignments::Columns(columns) => column_assignments(stmt, schema, columns),
        Assignments::Record { skip_zero } => record_assignments(stmt, schema, skip_zero),
        Assignments::None => Err(OrmError::user("update needs values to set")),
    }
}

fn column_assignments(
    stmt: &mut Statement,
    schema: &Arc<Schema>,
    columns: indexmap::IndexMap<String, Arg>,
) -> Result<Vec<Assignment>, OrmError> {
    let mut assignments = Vec::with_capacity(columns.len() + 1);
    let mut written = Vec::new();
    for (key, value) in columns {
        match schema.look_up_field(&key) {
            Some(field) => {
                if !stmt.field_selected(&field) || (!field.updatable && !stmt.flags.update_column)
                {
                    continue;
                }
                if let Arg::Value(v) = &value {
                    written.push((Arc::clone(&field), v.clone()));
                }
                assignments.push(Assignment::new(Column::new(field.db_name.as_str()), value));
            }
            None => assignments.push(Assignment::new(Column::new(key.as_str()), value)),
        }
    }

    if !stmt.flags.update_column {
        for field in &schema.fields {
            let listed = assignments.iter().any(|a| a.column.name == field.db_name);
            if let Some(unit) = field.auto_update_time {
                if !listed && field.updatable && stmt.field_selected(field) {
                    let now = unit.now();
                    written.push((Arc::clone(field), now.clone()));
                    assignments.push(Assignment::new(Column::new(field.db_name.as_str()), now));
                }
            }
        }
    }

    for record in stmt.dest.record_muts() {
        if !schema.is_record(record) {
            continue;
        }
        for (field, value) in &written {
            field.set(record, value.clone())?;
        }
    }
    Ok(assignments)
}

/// SET list read from the single destination record
fn record_assignments(
    stmt: &mut Statement,
    schema: &Arc<Schema>,
    skip_zero: bool,
) -> Result<Vec<Assignment>, OrmError> {
    if !matches!(&stmt.dest, Dest::Record(_)) && stmt.dest.len() != 1 {
        return Err(OrmError::user("updating from a record needs exactly one record"));
    }
    let explicit: Vec<String> = if stmt.has_explicit_selects() {
        stmt.selects.clone()
    } else {
        Vec::new()
    };
    let update_column = stmt.flags.update_column;
    let selected: Vec<bool> = schema.fields.iter().map(|f| stmt.field_selected(f)).collect();

    let mut assignments = Vec::new();
    for record in stmt.dest.record_muts() {
        if !schema.is_record(record) {
            return Err(OrmError::user(format!("record is not a {}", schema.name)));
        }
        for (field, selected) in schema.fields.iter().zip(&selected) {
            if field.primary_key || field.db_name.is_empty() || !field.updatable || !selected {
                continue;
            }
            let column = Column::new(field.db_name.as_str());
            if let (Some(unit), false) = (field.auto_update_time, update_column) {
                let now = unit.now();
                field.set(record, now.clone())?;
                assignments.push(Assignment::new(column, now));
                continue;
            }
            let (value, zero) = field.value_of(record);
            let named = explicit.iter().any(|s| *s == field.name || *s == field.db_name);
            if skip_zero && zero && !named {
                continue;
            }
            assignments.push(Assignment::new(column, value));
        }
    }
    Ok(assignments)
}

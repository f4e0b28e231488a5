//! Create stage
//!
//! Builds `INSERT .. VALUES .. [ON CONFLICT ..] [RETURNING ..]` from the
//! destination and writes generated keys back into it, either from the
//! RETURNING rows or by fanning out the driver's last insert id.

use crate::clause::{
    Arg, Assignment, Clause, ClauseExpr, Column, Insert, Returning, Values, CREATE_CLAUSES,
};
use crate::errors::OrmError;
use crate::model::{Dest, Row};
use crate::pool::Rows;
use crate::schema::{Field, Schema};
use crate::statement::Statement;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::Arc;
use type_mapping::Value;

pub(crate) fn create(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if stmt.error.is_some() {
            return;
        }
        if stmt.sql.is_empty() {
            if let Err(err) = prepare(stmt) {
                stmt.add_error(err);
                return;
            }
            stmt.build(CREATE_CLAUSES);
        }
        if stmt.error.is_some() || stmt.flags.dry_run {
            return;
        }

        if stmt.clauses.contains_key("RETURNING") && stmt.engine.dialect.supports_returning() {
            match stmt.query_sql().await {
                Ok(rows) => {
                    stmt.rows_affected = rows.len() as u64;
                    if let Err(err) = scan_returning(stmt, &rows) {
                        stmt.add_error(err);
                    }
                }
                Err(err) => stmt.add_error(err),
            }
            return;
        }

        match stmt.exec_sql().await {
            Ok(result) => {
                stmt.rows_affected = result.rows_affected;
                if let Some(id) = result.last_insert_id.filter(|id| *id != 0) {
                    if let Err(err) = backfill_ids(stmt, id) {
                        stmt.add_error(err);
                    }
                }
            }
            Err(err) => stmt.add_error(err),
        }
    })
}

/// Register INSERT, VALUES, the resolved ON CONFLICT and RETURNING
fn prepare(stmt: &mut Statement) -> Result<(), OrmError> {
    stmt.check_select_omit()?;
    let values = values_for_create(stmt)?;

    if let Some(Clause {
        expression: ClauseExpr::OnConflict(conflict),
        ..
    }) = stmt.clauses.get_mut("ON CONFLICT")
    {
        if conflict.update_all {
            let schema = stmt.schema.as_ref();
            let is_primary = |name: &str| {
                schema.is_some_and(|s| s.primary_fields.iter().any(|f| f.db_name == name))
            };
            conflict.do_updates = values
                .columns
                .iter()
                .filter(|c| !is_primary(&c.name))
                .map(|c| Assignment::excluded(&c.name))
                .collect();
            if conflict.columns.is_empty() {
                if let Some(schema) = schema {
                    conflict.columns = schema
                        .primary_fields
                        .iter()
                        .map(|f| Column::new(f.db_name.as_str()))
                        .collect();
                }
            }
            conflict.update_all = false;
            conflict.do_nothing = conflict.do_updates.is_empty();
        }
    }

    stmt.add_clause_if_not_exists(Insert::default());
    stmt.add_clause(values);

    let returning_defaults = stmt.engine.dialect.supports_returning()
        && stmt.dest.has_records()
        && !stmt.clauses.contains_key("RETURNING");
    if returning_defaults {
        if let Some(schema) = &stmt.schema {
            let columns: Vec<Column> = schema
                .fields_with_default_db_value
                .iter()
                .filter(|f| f.readable)
                .map(|f| Column::new(f.db_name.as_str()))
                .collect();
            if !columns.is_empty() {
                stmt.add_clause(Returning { columns });
            }
        }
    }
    Ok(())
}

/// Column list and row matrix of the INSERT
pub(crate) fn values_for_create(stmt: &mut Statement) -> Result<Values, OrmError> {
    match &stmt.dest {
        Dest::Map(row) => return Ok(map_values(stmt, std::slice::from_ref(row))),
        Dest::Maps(rows) => return Ok(map_values(stmt, rows)),
        Dest::Record(_) | Dest::Records(_) => {}
        other => {
            return Err(OrmError::user(format!(
                "cannot create from a {:?} destination",
                other.kind()
            )))
        }
    }
    record_values(stmt)
}

/// Sorted union of the keys; rows missing a key get NULL
fn map_values(stmt: &Statement, rows: &[Row]) -> Values {
    let schema = stmt.schema.as_deref();
    let column_of = |key: &str| -> Option<(String, Option<Arc<Field>>)> {
        match schema.and_then(|s| s.look_up_field(key)) {
            Some(field) if !field.creatable || !stmt.field_selected(&field) => None,
            Some(field) => Some((field.db_name.clone(), Some(field))),
            None => Some((key.to_string(), None)),
        }
    };

    let keys: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    let mut columns: Vec<(String, &str)> = keys
        .into_iter()
        .filter_map(|key| column_of(key).map(|(column, _)| (column, key)))
        .collect();

    // timestamps the caller left out
    let mut auto_time: Vec<Arc<Field>> = Vec::new();
    if let Some(schema) = schema {
        for field in &schema.fields {
            let tracked = field.auto_create_time.is_some() || field.auto_update_time.is_some();
            if tracked
                && field.creatable
                && stmt.field_selected(field)
                && !columns.iter().any(|(c, _)| *c == field.db_name)
            {
                auto_time.push(Arc::clone(field));
            }
        }
    }

    let matrix = rows
        .iter()
        .map(|row| {
            let mut values: Vec<Arg> = columns
                .iter()
                .map(|(_, key)| Arg::Value(row.get(*key).cloned().unwrap_or(Value::Null)))
                .collect();
            values.extend(
                auto_time
                    .iter()
                    .filter_map(|f| f.insert_default())
                    .map(Arg::Value),
            );
            values
        })
        .collect();

    columns.extend(auto_time.iter().map(|f| (f.db_name.clone(), "")));
    Values {
        columns: columns
            .into_iter()
            .map(|(column, _)| Column::new(column))
            .collect(),
        rows: matrix,
    }
}

fn is_db_default(schema: &Schema, field: &Field) -> bool {
    schema
        .fields_with_default_db_value
        .iter()
        .any(|f| f.db_name == field.db_name)
}

/// Regular columns first, then database-default columns some record sets
fn record_values(stmt: &mut Statement) -> Result<Values, OrmError> {
    let schema = stmt
        .schema
        .clone()
        .ok_or_else(|| OrmError::user("create needs a model with a schema"))?;
    let regular: Vec<Arc<Field>> = schema
        .db_names
        .iter()
        .filter_map(|name| schema.fields_by_db_name.get(name))
        .filter(|f| f.creatable && stmt.field_selected(f) && !is_db_default(&schema, f))
        .cloned()
        .collect();
    let extension: Vec<Arc<Field>> = schema
        .fields_with_default_db_value
        .iter()
        .filter(|f| f.creatable && stmt.field_selected(f))
        .cloned()
        .collect();

    let mut records = stmt.dest.record_muts();
    let mut rows: Vec<Vec<Arg>> = Vec::with_capacity(records.len());
    for record in records.iter_mut() {
        let record = &mut **record;
        if !schema.is_record(record) {
            return Err(OrmError::user(format!("record is not a {}", schema.name)));
        }
        let mut row = Vec::with_capacity(regular.len());
        for field in &regular {
            let (value, zero) = field.value_of(record);
            let value = match field.insert_default() {
                Some(default) if zero => {
                    if field.auto_create_time.is_some() || field.auto_update_time.is_some() {
                        field.set(record, default.clone())?;
                    }
                    default
                }
                _ => value,
            };
            row.push(Arg::Value(value));
        }
        rows.push(row);
    }

    let mut columns: Vec<Column> = regular
        .iter()
        .map(|f| Column::new(f.db_name.as_str()))
        .collect();
    for field in &extension {
        let values: Vec<(Value, bool)> = records.iter().map(|r| field.value_of(&**r)).collect();
        if values.iter().all(|(_, zero)| *zero) {
            continue;
        }
        columns.push(Column::new(field.db_name.as_str()));
        for (row, (value, zero)) in rows.iter_mut().zip(values) {
            row.push(if zero { Arg::Default } else { Arg::Value(value) });
        }
    }
    Ok(Values { columns, rows })
}

/// Distribute the last insert id over records whose primary key is zero
pub(crate) fn backfill_ids(stmt: &mut Statement, last_insert_id: i64) -> Result<(), OrmError> {
    let Some(schema) = stmt.schema.clone() else {
        return Ok(());
    };
    let Some(primary) = schema.prioritized_primary_field.clone() else {
        return Ok(());
    };
    if !primary.has_default_value || !primary.data_kind.is_integer() {
        return Ok(());
    }
    let step = primary.auto_increment_increment.max(1);
    let step = if stmt.engine.config.last_insert_id_reversed {
        -step
    } else {
        step
    };

    match &mut stmt.dest {
        Dest::Map(row) => {
            if !row.contains_key(&primary.name) && !row.contains_key(&primary.db_name) {
                row.insert(primary.db_name.clone(), Value::Int(last_insert_id));
            }
        }
        Dest::Maps(rows) => {
            let mut next = last_insert_id;
            for row in rows.iter_mut() {
                if !row.contains_key(&primary.name) && !row.contains_key(&primary.db_name) {
                    row.insert(primary.db_name.clone(), Value::Int(next));
                    next += step;
                }
            }
        }
        dest => {
            let mut next = last_insert_id;
            for record in dest.record_muts() {
                if primary.value_of(record).1 {
                    primary.set(record, Value::Int(next))?;
                    next += step;
                }
            }
        }
    }
    Ok(())
}

/// Copy RETURNING rows into the records, one row per inserted record
fn scan_returning(stmt: &mut Statement, rows: &Rows) -> Result<(), OrmError> {
    let Some(schema) = stmt.schema.clone() else {
        return Ok(());
    };
    let do_nothing = matches!(
        stmt.clauses.get("ON CONFLICT").map(|c| &c.expression),
        Some(ClauseExpr::OnConflict(c)) if c.do_nothing
    );
    let fields: Vec<Option<Arc<Field>>> = rows
        .columns
        .iter()
        .map(|c| schema.fields_by_db_name.get(c).cloned())
        .collect();

    let mut targets = stmt.dest.record_muts();
    if do_nothing && rows.len() < targets.len() {
        // skipped conflicts return nothing; fill the records still lacking a key
        targets.retain(|r| schema.primary_is_zero(&**r));
    }
    for (record, row) in targets.into_iter().zip(&rows.rows) {
        for (field, value) in fields.iter().zip(row) {
            if let Some(field) = field {
                field.set(record, value.clone())?;
            }
        }
    }
    Ok(())
}

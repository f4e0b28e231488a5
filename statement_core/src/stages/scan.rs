//! Copy result rows into the destination
//!
//! Columns map to fields by column name, then by field name. Columns named
//! `Relation__column` fill the nested record of a joined relation; a nested
//! record whose columns are all NULL is left unset.

use crate::errors::OrmError;
use crate::model::{Dest, Record, Row};
use crate::pool::Rows;
use crate::schema::{Cardinality, Field, Relationship, Schema};
use crate::statement::Statement;
use indexmap::IndexMap;
use std::any::Any;
use std::sync::Arc;
use type_mapping::Value;

enum Target {
    Field(Arc<Field>),
    Nested {
        relation: Arc<Relationship>,
        schema: Arc<Schema>,
        field: Arc<Field>,
    },
    Skip,
}

pub(crate) fn scan_rows(stmt: &mut Statement, rows: &Rows) -> Result<(), OrmError> {
    stmt.rows_affected = rows.len() as u64;
    match &mut stmt.dest {
        Dest::None => {}
        Dest::Map(map) => {
            if let Some(row) = rows.rows.first() {
                *map = to_row(&rows.columns, row);
            }
        }
        Dest::Maps(maps) => {
            *maps = rows.rows.iter().map(|row| to_row(&rows.columns, row)).collect();
        }
        Dest::Scalar(value) => {
            if let Some(row) = rows.rows.last() {
                *value = row.first().cloned().unwrap_or(Value::Null);
            }
        }
        Dest::Scalars(values) => {
            *values = rows
                .rows
                .iter()
                .map(|row| row.first().cloned().unwrap_or(Value::Null))
                .collect();
        }
        Dest::Record(_) | Dest::Records(_) => scan_records(stmt, rows)?,
    }
    if rows.is_empty() && stmt.flags.raise_not_found {
        return Err(OrmError::RecordNotFound);
    }
    Ok(())
}

fn to_row(columns: &[String], values: &[Value]) -> Row {
    columns.iter().cloned().zip(values.iter().cloned()).collect()
}

fn scan_records(stmt: &mut Statement, rows: &Rows) -> Result<(), OrmError> {
    let schema = stmt
        .dest_schema()?
        .ok_or_else(|| OrmError::user("scanning into records needs a model"))?;
    let targets = targets(stmt, &schema, &rows.columns);
    let mut errors = Vec::new();

    match &mut stmt.dest {
        Dest::Record(record) => {
            if let Some(row) = rows.rows.first() {
                fill(record.as_mut(), &targets, row, &mut errors);
            }
        }
        Dest::Records(records) => {
            *records = rows
                .rows
                .iter()
                .map(|row| {
                    let mut record = schema.new_record();
                    fill(record.as_mut(), &targets, row, &mut errors);
                    record
                })
                .collect();
        }
        _ => {}
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(OrmError::Multiple(errors)),
    }
}

fn targets(stmt: &Statement, schema: &Schema, columns: &[String]) -> Vec<Target> {
    columns
        .iter()
        .map(|column| {
            if let Some(field) = schema
                .fields_by_db_name
                .get(column)
                .or_else(|| schema.fields_by_name.get(column))
            {
                return Target::Field(Arc::clone(field));
            }
            let Some((name, nested)) = column.split_once("__") else {
                return Target::Skip;
            };
            let Ok((relation, resolved)) = schema.resolve_relation(name, &stmt.engine.schemas)
            else {
                return Target::Skip;
            };
            if relation.cardinality != Cardinality::One {
                return Target::Skip;
            }
            match resolved.target.fields_by_db_name.get(nested) {
                Some(field) => Target::Nested {
                    relation,
                    schema: Arc::clone(&resolved.target),
                    field: Arc::clone(field),
                },
                None => Target::Skip,
            }
        })
        .collect()
}

fn fill(record: &mut dyn Any, targets: &[Target], row: &[Value], errors: &mut Vec<OrmError>) {
    let mut nested: IndexMap<String, (Arc<Relationship>, Record, bool)> = IndexMap::new();
    for (target, value) in targets.iter().zip(row) {
        match target {
            Target::Field(field) => {
                if let Err(err) = field.set(record, value.clone()) {
                    errors.push(err);
                }
            }
            Target::Nested {
                relation,
                schema,
                field,
            } => {
                let entry = nested
                    .entry(relation.name.clone())
                    .or_insert_with(|| (Arc::clone(relation), schema.new_record(), false));
                if value.is_null() {
                    continue;
                }
                entry.2 = true;
                if let Err(err) = field.set(entry.1.as_mut(), value.clone()) {
                    errors.push(err);
                }
            }
            Target::Skip => {}
        }
    }
    for (_, (relation, related, any_set)) in nested {
        relation.clear(record);
        if any_set {
            relation.attach(record, related);
        }
    }
}

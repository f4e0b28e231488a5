//! Extra-column validation before create and update
//!
//! When the statement's database has domain metadata and its table declares
//! extra fields, each extra value about to be written is checked against the
//! field's shape rules. Statements without metadata pass unchecked.

use crate::clause::Arg;
use crate::errors::OrmError;
use crate::model::Dest;
use crate::statement::{Assignments, Statement};
use domain_meta::DomainField;
use type_mapping::Value;

pub(crate) fn check_extra_create(stmt: &mut Statement) {
    check_extra(stmt, "before_create");
}

pub(crate) fn check_extra_update(stmt: &mut Statement) {
    check_extra(stmt, "before_update");
}

fn check_extra(stmt: &mut Statement, stage: &'static str) {
    if stmt.error.is_some() || stmt.table.is_empty() {
        return;
    }
    let Some(db) = stmt.engine.domain.resolve(stmt) else {
        return;
    };
    let Some(meta) = stmt.engine.domain.store.db(&db) else {
        return;
    };
    let Some(table) = meta.table(&stmt.table) else {
        return;
    };

    for field in table.extra_fields() {
        for text in extra_values(stmt, &field.name) {
            if let Err(source) = field.check(&text) {
                let err = failure(stage, &db, &stmt.table, field, source);
                stmt.add_error(err);
                return;
            }
        }
    }
}

fn failure(
    stage: &'static str,
    db: &str,
    table: &str,
    field: &DomainField,
    source: domain_meta::DomainError,
) -> OrmError {
    OrmError::ExtraCheck {
        stage,
        db: db.to_string(),
        table: table.to_string(),
        field: field.name.clone(),
        source,
    }
}

/// JSON text of every value the statement writes into `column`
fn extra_values(stmt: &Statement, column: &str) -> Vec<String> {
    let mut values = Vec::new();
    if let Assignments::Columns(columns) = &stmt.assignments {
        if let Some(Arg::Value(value)) = columns.get(column) {
            values.extend(as_text(value));
        }
    }
    match &stmt.dest {
        Dest::Map(row) => values.extend(row.get(column).and_then(as_text)),
        Dest::Maps(rows) => values.extend(rows.iter().filter_map(|r| r.get(column)).filter_map(as_text)),
        Dest::Record(_) | Dest::Records(_) => {
            let field = stmt.schema.as_ref().and_then(|s| s.look_up_field(column));
            if let Some(field) = field {
                for record in stmt.dest.record_refs() {
                    values.extend(as_text(&field.value_of(record).0));
                }
            }
        }
        _ => {}
    }
    values
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Json(json) => Some(json.to_string()),
        _ => None,
    }
}

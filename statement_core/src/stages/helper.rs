//! Pieces shared by the stages

use crate::clause::{Arg, Column, Expr, Where};
use crate::errors::OrmError;
use crate::schema::ClauseHook;
use crate::statement::Statement;
use type_mapping::Value;

/// Condition selecting the destination records by primary key
pub(crate) fn primary_conditions(stmt: &Statement) -> Option<Expr> {
    let schema = stmt.schema.as_ref()?;
    if schema.primary_fields.is_empty() {
        return None;
    }
    let mut keys: Vec<Vec<Value>> = Vec::new();
    for record in stmt.dest.record_refs() {
        if !schema.is_record(record) {
            continue;
        }
        let values: Vec<(Value, bool)> = schema
            .primary_fields
            .iter()
            .map(|f| f.value_of(record))
            .collect();
        if values.iter().any(|(_, zero)| *zero) {
            continue;
        }
        keys.push(values.into_iter().map(|(v, _)| v).collect());
    }
    if keys.is_empty() {
        return None;
    }

    if let [field] = schema.primary_fields.as_slice() {
        let column = Column::current(field.db_name.as_str());
        let mut values: Vec<Arg> = keys
            .into_iter()
            .filter_map(|key| key.into_iter().next())
            .map(Arg::Value)
            .collect();
        return Some(if values.len() == 1 {
            Expr::eq(column, values.remove(0))
        } else {
            Expr::in_list(column, values)
        });
    }

    let per_record: Vec<Expr> = keys
        .into_iter()
        .map(|key| {
            Expr::and(
                schema
                    .primary_fields
                    .iter()
                    .zip(key)
                    .map(|(field, value)| Expr::eq(Column::current(field.db_name.as_str()), value))
                    .collect(),
            )
        })
        .collect();
    Some(if per_record.len() == 1 {
        per_record.into_iter().next()?
    } else {
        Expr::or(per_record)
    })
}

/// Add `deleted_at IS NULL` for soft-deleting schemas
pub(crate) fn scope_soft_delete(stmt: &mut Statement, hooks: &[ClauseHook]) {
    if stmt.flags.unscoped {
        return;
    }
    for hook in hooks {
        match hook {
            ClauseHook::SoftDelete { field } => {
                let condition = Expr::eq(Column::current(field.db_name.as_str()), Value::Null);
                if !stmt.where_exprs().contains(&condition) {
                    stmt.add_clause(Where::new(vec![condition]));
                }
            }
        }
    }
}

/// Fail UPDATE/DELETE statements without conditions
pub(crate) fn guard_global_update(stmt: &Statement) -> Result<(), OrmError> {
    if stmt.flags.allow_global_update {
        return Ok(());
    }
    if !has_user_conditions(stmt) {
        return Err(OrmError::MissingWhereClause);
    }
    Ok(())
}

/// Conditions that only come from the soft-delete scope do not count
pub(crate) fn has_user_conditions(stmt: &Statement) -> bool {
    let Some(schema) = &stmt.schema else {
        return stmt.where_exprs().iter().any(|expr| !expr.is_empty());
    };
    let scope: Vec<Expr> = schema
        .soft_delete_field
        .iter()
        .map(|field| Expr::eq(Column::current(field.db_name.as_str()), Value::Null))
        .collect();
    stmt.where_exprs()
        .iter()
        .any(|expr| !expr.is_empty() && !scope.contains(expr))
}

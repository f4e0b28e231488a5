//! Key bookkeeping shared by preloading, association saving and association mode

use crate::clause::{Arg, Column, Expr};
use crate::schema::{Field, Schema};
use std::any::Any;
use std::sync::Arc;
use type_mapping::Value;

/// Stable map key for a tuple of values
pub(crate) fn identity(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::identity_key)
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Values of `fields` on `record`, or `None` when every one of them is zero
pub(crate) fn key_of(fields: &[Arc<Field>], record: &dyn Any) -> Option<Vec<Value>> {
    let values: Vec<(Value, bool)> = fields.iter().map(|f| f.value_of(record)).collect();
    if values.iter().all(|(_, zero)| *zero) {
        return None;
    }
    Some(values.into_iter().map(|(v, _)| v).collect())
}

/// `col IN (...)` for one column, `(a = ? AND b = ?) OR ...` for several
pub(crate) fn in_condition(columns: &[Column], keys: &[Vec<Value>]) -> Expr {
    if let [column] = columns {
        let values: Vec<Arg> = keys
            .iter()
            .filter_map(|key| key.first().cloned())
            .map(Arg::Value)
            .collect();
        return Expr::in_list(column.clone(), values);
    }
    Expr::or(
        keys.iter()
            .map(|key| {
                Expr::and(
                    columns
                        .iter()
                        .zip(key)
                        .map(|(column, value)| Expr::eq(column.clone(), value.clone()))
                        .collect(),
                )
            })
            .collect(),
    )
}

/// Whether every field of a nested record is zero (an unset relation)
pub(crate) fn record_is_zero(schema: &Schema, record: &dyn Any) -> bool {
    schema.fields.iter().all(|f| f.value_of(record).1)
}

/// Copy every field of `from` onto `to`; both must be records of `schema`
pub(crate) fn copy_fields(
    schema: &Schema,
    from: &dyn Any,
    to: &mut dyn Any,
) -> Result<(), crate::errors::OrmError> {
    for field in &schema.fields {
        let (value, _) = field.value_of(from);
        field.set(to, value)?;
    }
    Ok(())
}

/// Distinct keys in first-seen order
pub(crate) fn distinct_keys(keys: impl IntoIterator<Item = Vec<Value>>) -> Vec<Vec<Value>> {
    let mut seen = std::collections::HashSet::new();
    keys.into_iter()
        .filter(|key| seen.insert(identity(key)))
        .collect()
}

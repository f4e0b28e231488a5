//! Zero-value detection
//!
//! A field is "zero" when it holds the default of its type; create stages
//! substitute declared defaults for zero fields.

use crate::types::Value;

pub fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Int(v) => *v == 0,
        Value::UInt(v) => *v == 0,
        Value::Float(v) => *v == 0.0,
        Value::String(s) => s.is_empty(),
        Value::Bytes(b) => b.is_empty(),
        Value::Time(t) => t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0,
        Value::Uuid(u) => u.is_nil(),
        Value::Json(j) => j.is_null(),
        Value::Array(items) => items.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[test]
    fn defaults_are_zero() {
        assert!(is_zero_value(&Value::Time(DateTime::<Utc>::default())));
        assert!(is_zero_value(&Value::Uuid(uuid::Uuid::nil())));
        assert!(!is_zero_value(&Value::Int(-1)));
        assert!(!is_zero_value(&Value::from("a")));
    }
}

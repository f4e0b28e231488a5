//! Runtime values and the conversion trait used by record fields

use crate::errors::ConvertError;
use crate::sql::DataKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Driver-neutral value carried in clause variables and result rows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in conversion diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Time(_) => "time",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Stable textual key used to group rows by identity (join keys, preload maps).
    /// Integers compare equal regardless of signedness.
    pub fn identity_key(&self) -> String {
        match self {
            Value::Null => "<nil>".to_string(),
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => (*v as i64).to_string(),
            other => other.to_string(),
        }
    }

    /// Add `n` to an integer value, keeping its signedness
    pub fn offset_by(&self, n: i64) -> Option<Value> {
        match self {
            Value::Int(v) => Some(Value::Int(v.checked_add(n)?)),
            Value::UInt(v) => {
                let shifted = i128::from(*v) + i128::from(n);
                u64::try_from(shifted).ok().map(Value::UInt)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "<binary:{}>", b.len()),
            Value::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.3f")),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Json(j) => write!(f, "{j}"),
            Value::Array(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Conversion between a Rust field type and `Value`
pub trait FieldValue: Sized {
    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, ConvertError>;

    /// Kind inferred when the field carries no explicit `type` annotation
    fn data_kind() -> DataKind;

    fn is_zero(&self) -> bool {
        crate::validate::is_zero_value(&self.to_value())
    }

    fn nullable() -> bool {
        false
    }
}

fn mismatch(expected: &'static str, value: &Value) -> ConvertError {
    if value.is_null() {
        ConvertError::UnexpectedNull { expected }
    } else {
        ConvertError::Mismatch {
            expected,
            found: value.type_name(),
        }
    }
}

macro_rules! impl_signed {
    ($($ty:ty => $kind:expr),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn to_value(&self) -> Value {
                Value::Int(*self as i64)
            }

            fn from_value(value: Value) -> Result<Self, ConvertError> {
                let wide = value.as_i64().ok_or_else(|| mismatch(stringify!($ty), &value))?;
                <$ty>::try_from(wide).map_err(|_| ConvertError::OutOfRange {
                    expected: stringify!($ty),
                    value: wide.to_string(),
                })
            }

            fn data_kind() -> DataKind {
                $kind
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($ty:ty => $kind:expr),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn to_value(&self) -> Value {
                Value::UInt(*self as u64)
            }

            fn from_value(value: Value) -> Result<Self, ConvertError> {
                let wide: u64 = match &value {
                    Value::UInt(v) => *v,
                    Value::Int(v) => u64::try_from(*v).map_err(|_| ConvertError::OutOfRange {
                        expected: stringify!($ty),
                        value: v.to_string(),
                    })?,
                    other => {
                        let v = other.as_i64().ok_or_else(|| mismatch(stringify!($ty), other))?;
                        u64::try_from(v).map_err(|_| ConvertError::OutOfRange {
                            expected: stringify!($ty),
                            value: v.to_string(),
                        })?
                    }
                };
                <$ty>::try_from(wide).map_err(|_| ConvertError::OutOfRange {
                    expected: stringify!($ty),
                    value: wide.to_string(),
                })
            }

            fn data_kind() -> DataKind {
                $kind
            }
        }
    )*};
}

impl_signed!(i8 => DataKind::Int, i16 => DataKind::Int, i32 => DataKind::Int, i64 => DataKind::WideInt);
impl_unsigned!(u8 => DataKind::Int, u16 => DataKind::Int, u32 => DataKind::Int, u64 => DataKind::WideInt);

impl FieldValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(v) => Ok(v != 0),
            Value::UInt(v) => Ok(v != 0),
            Value::String(ref s) => match s.as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(ConvertError::Parse {
                    expected: "bool",
                    value: s.clone(),
                }),
            },
            other => Err(mismatch("bool", &other)),
        }
    }

    fn data_kind() -> DataKind {
        DataKind::Bool
    }
}

impl FieldValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            Value::UInt(v) => Ok(v as f64),
            Value::String(ref s) => s.trim().parse().map_err(|_| ConvertError::Parse {
                expected: "f64",
                value: s.clone(),
            }),
            other => Err(mismatch("f64", &other)),
        }
    }

    fn data_kind() -> DataKind {
        DataKind::Double
    }
}

impl FieldValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        f64::from_value(value).map(|v| v as f32)
    }

    fn data_kind() -> DataKind {
        DataKind::Float
    }
}

impl FieldValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::String(s) => Ok(s),
            Value::Bytes(b) => String::from_utf8(b).map_err(|e| ConvertError::Parse {
                expected: "String",
                value: e.to_string(),
            }),
            Value::Json(serde_json::Value::String(s)) => Ok(s),
            Value::Json(j) => Ok(j.to_string()),
            Value::Null => Err(mismatch("String", &Value::Null)),
            other => Ok(other.to_string()),
        }
    }

    fn data_kind() -> DataKind {
        DataKind::String
    }
}

impl FieldValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.into_bytes()),
            other => Err(mismatch("Vec<u8>", &other)),
        }
    }

    fn data_kind() -> DataKind {
        DataKind::Bytes
    }
}

impl FieldValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Time(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Time(t) => Ok(t),
            Value::String(ref s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|t| t.and_utc())
                })
                .map_err(|_| ConvertError::Parse {
                    expected: "DateTime<Utc>",
                    value: s.clone(),
                }),
            Value::Int(secs) => DateTime::from_timestamp(secs, 0).ok_or(ConvertError::OutOfRange {
                expected: "DateTime<Utc>",
                value: secs.to_string(),
            }),
            other => Err(mismatch("DateTime<Utc>", &other)),
        }
    }

    fn data_kind() -> DataKind {
        DataKind::Time
    }
}

impl FieldValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Time(self.and_utc())
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        DateTime::<Utc>::from_value(value).map(|t| t.naive_utc())
    }

    fn data_kind() -> DataKind {
        DataKind::Time
    }
}

impl FieldValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Time(self.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::String(ref s) if s.len() == 10 => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ConvertError::Parse {
                    expected: "NaiveDate",
                    value: s.clone(),
                })
            }
            other => DateTime::<Utc>::from_value(other).map(|t| t.date_naive()),
        }
    }

    fn data_kind() -> DataKind {
        DataKind::Time
    }
}

impl FieldValue for Uuid {
    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Uuid(u) => Ok(u),
            Value::String(ref s) => Uuid::parse_str(s).map_err(|_| ConvertError::Parse {
                expected: "Uuid",
                value: s.clone(),
            }),
            Value::Bytes(ref b) => Uuid::from_slice(b).map_err(|_| ConvertError::Parse {
                expected: "Uuid",
                value: format!("<binary:{}>", b.len()),
            }),
            other => Err(mismatch("Uuid", &other)),
        }
    }

    fn data_kind() -> DataKind {
        DataKind::String
    }
}

impl FieldValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Json(j) => Ok(j),
            Value::String(s) => serde_json::from_str(&s).map_err(|_| ConvertError::Parse {
                expected: "serde_json::Value",
                value: s,
            }),
            Value::Bytes(b) => serde_json::from_slice(&b).map_err(|e| ConvertError::Parse {
                expected: "serde_json::Value",
                value: e.to_string(),
            }),
            other => Ok(crate::serialize::value_to_json(&other)),
        }
    }

    fn data_kind() -> DataKind {
        DataKind::Object
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn data_kind() -> DataKind {
        T::data_kind()
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }

    fn nullable() -> bool {
        true
    }
}

impl FieldValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        Ok(value)
    }

    fn data_kind() -> DataKind {
        DataKind::String
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(val: $ty) -> Self {
                FieldValue::to_value(&val)
            }
        }
    )*};
}

impl_from_for_value!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, Vec<u8>, DateTime<Utc>,
    NaiveDateTime, NaiveDate, Uuid, serde_json::Value
);

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::String(val.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_cross_signedness() {
        assert_eq!(u64::from_value(Value::Int(7)).unwrap(), 7);
        assert_eq!(i32::from_value(Value::UInt(9)).unwrap(), 9);
        assert!(u8::from_value(Value::Int(-1)).is_err());
        assert!(i8::from_value(Value::Int(300)).is_err());
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(Value::from("x")).unwrap(),
            Some("x".to_string())
        );
        assert!(String::from_value(Value::Null).is_err());
        assert!(Option::<i64>::nullable());
    }

    #[test]
    fn identity_key_ignores_signedness() {
        assert_eq!(Value::Int(7).identity_key(), Value::UInt(7).identity_key());
        assert_eq!(Value::Float(7.0).identity_key(), "7");
    }

    #[test]
    fn offset_keeps_variant() {
        assert_eq!(Value::UInt(7).offset_by(1), Some(Value::UInt(8)));
        assert_eq!(Value::Int(7).offset_by(-1), Some(Value::Int(6)));
        assert_eq!(Value::UInt(0).offset_by(-1), None);
    }

    #[test]
    fn zero_detection() {
        assert!(0i64.is_zero());
        assert!(String::new().is_zero());
        assert!(!Some(0i64).is_zero());
        assert!(Option::<i64>::None.is_zero());
    }
}

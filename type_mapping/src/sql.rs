//! Column type classification
//!
//! Maps declared SQL type names onto the coarse data kinds used by the
//! schema reflector and the domain checker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse data kind of a column or of a JSON shape rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataKind {
    Bool,
    Int,
    WideInt,
    Float,
    Double,
    String,
    Time,
    Bit,
    Bytes,
    Array,
    Object,
}

impl DataKind {
    /// Classify a declared SQL type such as `varchar(255)` or `BIGINT UNSIGNED`.
    /// Unknown names fall back to `String`.
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        let base = upper
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        match base {
            "BOOL" | "BOOLEAN" => DataKind::Bool,
            "INT" | "INTEGER" | "TINYINT" | "SMALLINT" | "MEDIUMINT" => DataKind::Int,
            "BIGINT" => DataKind::WideInt,
            "FLOAT" => DataKind::Float,
            "DOUBLE" | "DECIMAL" | "REAL" => DataKind::Double,
            "DATE" | "DATETIME" | "TIMESTAMP" | "TIME" | "YEAR" => DataKind::Time,
            "VARCHAR" | "CHAR" | "ENUM" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT"
            | "JSON" => DataKind::String,
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
                DataKind::Bytes
            }
            "BIT" => DataKind::Bit,
            _ => DataKind::String,
        }
    }

    /// Diagnostic name, e.g. `FieldString`
    pub fn name(&self) -> &'static str {
        match self {
            DataKind::Bool => "FieldBool",
            DataKind::Int => "FieldInt",
            DataKind::WideInt => "FieldInt64",
            DataKind::Float => "FieldFloat",
            DataKind::Double => "FieldFloat64",
            DataKind::String => "FieldString",
            DataKind::Time => "FieldTime",
            DataKind::Bit => "FieldBit",
            DataKind::Bytes => "FieldBin",
            DataKind::Array => "FieldArray",
            DataKind::Object => "FieldObject",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DataKind::Int | DataKind::WideInt | DataKind::Bit)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, DataKind::Float | DataKind::Double)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataKind {
    type Err = std::convert::Infallible;

    /// Accepts diagnostic names (`FieldInt64`), rule shorthands (`array`,
    /// `object`, `int`, `double`) and SQL type names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim() {
            "FieldBool" | "bool" => DataKind::Bool,
            "FieldInt" | "int" => DataKind::Int,
            "FieldInt64" | "int64" => DataKind::WideInt,
            "FieldFloat" | "float" => DataKind::Float,
            "FieldFloat64" | "double" | "float64" => DataKind::Double,
            "FieldString" | "string" => DataKind::String,
            "FieldTime" | "time" => DataKind::Time,
            "FieldBit" | "bit" => DataKind::Bit,
            "FieldBin" | "bytes" => DataKind::Bytes,
            "FieldArray" | "array" => DataKind::Array,
            "FieldObject" | "object" => DataKind::Object,
            other => DataKind::from_type_name(other),
        };
        Ok(kind)
    }
}

impl TryFrom<String> for DataKind {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataKind> for String {
    fn from(kind: DataKind) -> Self {
        kind.name().to_string()
    }
}

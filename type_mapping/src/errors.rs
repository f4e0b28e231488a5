//! Conversion errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("cannot convert {found} into {expected}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {value} out of range for {expected}")]
    OutOfRange { expected: &'static str, value: String },

    #[error("cannot parse {value:?} as {expected}")]
    Parse { expected: &'static str, value: String },

    #[error("unexpected NULL for non-nullable {expected}")]
    UnexpectedNull { expected: &'static str },
}

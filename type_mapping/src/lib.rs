//! Unified value model shared by every ormchain crate
//!
//! `Value` is the driver-neutral scalar that flows between record fields,
//! clause variables and connection pools. `FieldValue` converts Rust field
//! types to and from it, and `DataKind` classifies declared column types.

pub mod errors;
pub mod serialize;
pub mod sql;
pub mod types;
pub mod validate;

pub use errors::ConvertError;
pub use serialize::{json_to_value, value_to_json};
pub use sql::DataKind;
pub use types::{FieldValue, Value};
pub use validate::is_zero_value;

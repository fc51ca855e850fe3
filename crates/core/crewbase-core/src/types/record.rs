//! Record and filter vocabulary

use crate::{CrewbaseError, Result};
use serde_json::{Map, Value};

/// One row's worth of field → value data
pub type Record = Map<String, Value>;

/// Conjunctive equality constraints, field → exact value
///
/// Empty means "no restriction".
pub type FilterSet = Map<String, Value>;

/// Convert a JSON value into a [`Record`]
///
/// Only objects qualify; anything else is a validation error.
pub fn record_from_value(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CrewbaseError::validation(format!(
            "Expected a JSON object, got: {}",
            other
        ))),
    }
}

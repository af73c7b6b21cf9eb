//! Allow-lists of the fields an API caller may write.
//!
//! Each operation that accepts client JSON names an [`AllowList`]; the
//! payload is checked against it before it is turned into a typed
//! patch, and a field outside the list rejects the whole payload.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::BackendError;

#[derive(Clone, Copy, Debug)]
pub struct AllowList {
    operation: &'static str,
    fields: &'static [&'static str],
}

impl AllowList {
    pub const fn new(operation: &'static str, fields: &'static [&'static str]) -> Self {
        AllowList { operation, fields }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    /// Whether every field on this list is also on `other`.
    pub fn is_subset_of(&self, other: &AllowList) -> bool {
        self.fields.iter().all(|field| other.contains(field))
    }

    /// Fails on the first field (in name order) that is not allowed.
    pub fn check(&self, object: &Map<String, Value>) -> Result<(), BackendError> {
        let mut keys = object.keys().collect::<Vec<_>>();
        keys.sort();

        match keys.into_iter().find(|key| !self.contains(key)) {
            Some(field) => Err(BackendError::FieldNotAllowed {
                field: field.clone(),
                operation: self.operation,
            }),
            None => Ok(()),
        }
    }

    /// Checks `value` against the list and parses it into `T`.
    pub fn assign<T: DeserializeOwned>(&self, value: Value) -> Result<T, BackendError> {
        match &value {
            Value::Object(object) => self.check(object)?,
            _ => return Err(BackendError::FieldsNotAnObject),
        }

        serde_json::from_value(value).map_err(BackendError::MalformedFields)
    }
}

//! Storage trait definitions and filter types.

use crate::error::Result;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Filter operations for querying records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Field equals value
    Eq,
    /// Field does not equal value
    Ne,
}

/// A filter on one top-level field of a stored record.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Ne,
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        }
    }

    /// Check if a record matches this filter. Missing fields compare as null.
    pub fn matches(&self, record: &Value) -> bool {
        let field_value = record.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => *field_value == self.value,
            FilterOp::Ne => *field_value != self.value,
        }
    }
}

/// Trait for records keyed by a string id.
pub trait HasId {
    fn id(&self) -> &str;
}

/// Collection-oriented record storage.
pub trait Storage: Send + Sync {
    /// Insert a new record; fails if the id already exists.
    fn create<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()>;

    /// Insert or replace a record by id.
    fn upsert<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()>;

    /// Get a record by id.
    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>>;

    /// Delete a record by id. Returns false if it did not exist.
    fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Query records matching every filter.
    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>>;

    /// List all records in a collection.
    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }
}

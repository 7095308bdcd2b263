//! Schema-evolvable wire record.
//!
//! Events and other cross-process payloads travel as `Record`s: a
//! key-value structure where readers tolerate unknown or absent fields.
//! This is what crosses the pub/sub topic and the change journal — never a
//! typed Rust value and never a closure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque, schema-evolvable record.
///
/// Backed by a sorted map so two records with the same fields serialize
/// identically regardless of insertion order, which keeps journal replay
/// and hashing deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Unknown/absent fields are simply missing from the map; this never
    /// errors, matching the "readers tolerate unknown/absent fields"
    /// requirement.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

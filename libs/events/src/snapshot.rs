//! Schemaless pod snapshot as delivered by the watch layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TranslateError;

/// A pod object in its raw JSON form.
///
/// Nested string lookups follow the usual unstructured-object rules: a
/// missing or `null` field is absent, an intermediate that is not an object or
/// a leaf that is not a string is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodSnapshot(Value);

impl PodSnapshot {
    /// Wrap a raw JSON pod object.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// `status.phase`, if present.
    pub fn phase(&self) -> Result<Option<&str>, TranslateError> {
        self.nested_str(&["status", "phase"])
    }

    /// `status.podIP`, if present.
    pub fn pod_ip(&self) -> Result<Option<&str>, TranslateError> {
        self.nested_str(&["status", "podIP"])
    }

    /// `metadata.resourceVersion`, if present.
    pub fn resource_version(&self) -> Result<Option<&str>, TranslateError> {
        self.nested_str(&["metadata", "resourceVersion"])
    }

    /// `metadata.name`, or an empty string.
    pub fn name(&self) -> &str {
        self.lenient_str(&["metadata", "name"])
    }

    /// `metadata.namespace`, or an empty string.
    pub fn namespace(&self) -> &str {
        self.lenient_str(&["metadata", "namespace"])
    }

    /// `metadata.uid`, or an empty string.
    pub fn uid(&self) -> &str {
        self.lenient_str(&["metadata", "uid"])
    }

    /// Look up a single annotation value.
    ///
    /// Malformed annotation maps read as empty.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.0
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
    }

    fn lenient_str(&self, path: &[&str]) -> &str {
        self.nested_str(path).ok().flatten().unwrap_or_default()
    }

    fn nested_str(&self, path: &[&str]) -> Result<Option<&str>, TranslateError> {
        let mut current = &self.0;
        for (depth, key) in path.iter().enumerate() {
            let Value::Object(map) = current else {
                return Err(TranslateError::UnexpectedType {
                    path: path[..depth].join("."),
                    expected: "object",
                    found: json_type(current),
                });
            };
            match map.get(*key) {
                None | Some(Value::Null) => return Ok(None),
                Some(next) => current = next,
            }
        }

        match current {
            Value::String(s) => Ok(Some(s.as_str())),
            other => Err(TranslateError::UnexpectedType {
                path: path.join("."),
                expected: "string",
                found: json_type(other),
            }),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

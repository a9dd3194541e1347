//! Highlight batch and record types
//!
//! The upstream API returns a loosely shaped JSON document. Only two things
//! are relied on: a top-level `data` array, and per-record identity taken
//! from `id` or, failing that, `url`. Everything else is carried through
//! verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{CommonError, Result};

/// Field holding the ordered record sequence
pub const DATA_FIELD: &str = "data";

/// Primary identifier field, always set on stored records
pub const ID_FIELD: &str = "id";

/// Fallback identifier field
pub const URL_FIELD: &str = "url";

/// Field stamped with the run's fetch date on stored records
pub const FETCH_DATE_FIELD: &str = "fetch_date";

/// One fetched document, kept exactly as the API returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HighlightBatch {
    document: Map<String, Value>,
}

impl HighlightBatch {
    /// Wrap a parsed JSON value; anything but an object is rejected
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(document) => Ok(Self { document }),
            other => Err(CommonError::InvalidDocument(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Entries of the `data` array in original order.
    ///
    /// A missing or non-array `data` field yields no entries.
    pub fn entries(&self) -> &[Value] {
        match self.document.get(DATA_FIELD) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Canonical JSON encoding of the whole document
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.document)?)
    }
}

/// A single highlight entry: string keys to arbitrary JSON values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HighlightRecord {
    fields: Map<String, Value>,
}

impl HighlightRecord {
    /// Copy a batch entry into a record. Non-object entries have no fields
    /// to address and yield `None`.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        entry.as_object().map(|fields| Self {
            fields: fields.clone(),
        })
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Derive the storage key: `id` when present and non-empty, else `url`.
    pub fn key(&self) -> Option<RecordKey> {
        [ID_FIELD, URL_FIELD]
            .iter()
            .filter_map(|field| self.fields.get(*field))
            .find(|value| is_present(value))
            .map(RecordKey::from_value)
    }

    /// Set `id` to the derived key and stamp the fetch date
    pub fn stamp(&mut self, key: &RecordKey, fetch_date: &str) {
        self.fields
            .insert(ID_FIELD.to_string(), Value::String(key.as_str().to_string()));
        self.fields.insert(
            FETCH_DATE_FIELD.to_string(),
            Value::String(fetch_date.to_string()),
        );
    }
}

/// String form of a record's identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Strings are used verbatim and booleans become `True` / `False`,
    /// matching keys written by the earlier ingestion job. Numbers, arrays
    /// and objects use their compact JSON text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self(s.clone()),
            Value::Bool(true) => Self("True".to_string()),
            Value::Bool(false) => Self("False".to_string()),
            other => Self(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Null, `false`, zero and empty strings/arrays/objects do not count as an identifier
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

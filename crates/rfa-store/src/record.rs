//! Records, rows and the identity/timestamp invariants
//!
//! A [`Row`] is caller input: any flat JSON object. A [`Record`] is what a table
//! stores: a row that has been given an `id`, `created_at` and `updated_at`.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DbError;
use crate::table::Table;
use crate::DbResult;

/// Caller-supplied field map for insert/update.
pub type Row = Map<String, Value>;

pub const ID: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Render a timestamp the way every record stores it (`2024-01-01T00:00:00.000Z`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as a record timestamp string.
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

/// Convert any serializable value into a [`Row`]. Non-objects are rejected.
pub fn to_row<T: Serialize>(value: T) -> DbResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(DbError::invalid(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One stored row. Always carries `id`, `created_at` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Build a fresh record from insert input.
    ///
    /// Keeps a caller-provided string id, otherwise assigns a UUID v4. Table
    /// defaults fill absent fields; both timestamps are set to `now`.
    pub fn from_insert(table: Table, row: Row, now: &str) -> DbResult<Self> {
        let mut fields = table.defaults();
        for (key, value) in row {
            fields.insert(key, value);
        }

        let id = match fields.get(ID) {
            None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) => {
                return Err(DbError::invalid(format!(
                    "id must be a non-empty string, got {other}"
                )))
            }
        };
        fields.insert(ID.to_string(), Value::String(id));
        fields.insert(CREATED_AT.to_string(), Value::String(now.to_string()));
        fields.insert(UPDATED_AT.to_string(), Value::String(now.to_string()));
        Ok(Record(fields))
    }

    /// Wrap a stored map. Used when reading back from a backend.
    pub(crate) fn from_stored(value: Value) -> DbResult<Self> {
        match value {
            Value::Object(map) if map.get(ID).and_then(Value::as_str).is_some() => {
                Ok(Record(map))
            }
            other => Err(DbError::BackendFailure(format!(
                "stored document is not a record: {other}"
            ))),
        }
    }

    pub fn id(&self) -> &str {
        self.0.get(ID).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn created_at(&self) -> &str {
        self.0.get(CREATED_AT).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn updated_at(&self) -> &str {
        self.0.get(UPDATED_AT).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Shallow merge of `patch` onto this record.
    ///
    /// `id` and `created_at` never change. `updated_at` becomes `now`, clamped so
    /// it never sorts before `created_at`.
    pub fn merged(&self, patch: Row, now: &str) -> Record {
        let mut fields = self.0.clone();
        for (key, value) in patch {
            if key == ID || key == CREATED_AT {
                continue;
            }
            fields.insert(key, value);
        }
        let created = self.created_at();
        let stamp = if now < created { created } else { now };
        fields.insert(UPDATED_AT.to_string(), Value::String(stamp.to_string()));
        Record(fields)
    }

    /// Keep only the given columns. An empty list keeps everything.
    pub(crate) fn project(self, columns: &[String]) -> Record {
        if columns.is_empty() {
            return self;
        }
        let fields = self
            .0
            .into_iter()
            .filter(|(key, _)| columns.iter().any(|c| c == key))
            .collect();
        Record(fields)
    }

    pub(crate) fn with_field(mut self, key: impl Into<String>, value: Value) -> Record {
        self.0.insert(key.into(), value);
        self
    }

    /// Deserialize into a typed row such as [`crate::models::Post`].
    pub fn decode<T: DeserializeOwned>(&self) -> DbResult<T> {
        serde_json::from_value(Value::Object(self.0.clone())).map_err(DbError::from)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values used by `order` modifiers.
///
/// null < bool < number < string < array < object. Arrays and objects compare
/// equal among themselves so a stable sort keeps their relative order.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Column definitions and value coercion.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Name of the synthetic row identifier column present on every table.
pub const CQ_ID_COLUMN: &str = "_cq_id";

/// Name of the column linking a child row to its parent row.
pub const CQ_PARENT_ID_COLUMN: &str = "_cq_parent_id";

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Int,
    Bool,
    Timestamp,
    Json,
    StringList,
    Uuid,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Bool => "bool",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
            ColumnType::StringList => "string_list",
            ColumnType::Uuid => "uuid",
        };
        write!(f, "{name}")
    }
}

/// Where a column takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// JSON pointer into the API item, e.g. `/folderId`.
    Path(String),
    /// JSON pointer into the parent's API item.
    ParentPath(String),
    /// The row's own identifier.
    CqId,
    /// The parent row's identifier.
    CqParentId,
}

/// A typed column of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub primary_key: bool,
    #[serde(skip)]
    pub source: ValueSource,
}

impl Column {
    /// Column read from a JSON pointer into the API item.
    pub fn new(name: impl Into<String>, column_type: ColumnType, pointer: &str) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            source: ValueSource::Path(pointer.to_string()),
        }
    }

    /// Column read from a JSON pointer into the parent's API item.
    pub fn from_parent(name: impl Into<String>, column_type: ColumnType, pointer: &str) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            source: ValueSource::ParentPath(pointer.to_string()),
        }
    }

    pub(crate) fn cq_id() -> Self {
        Self {
            name: CQ_ID_COLUMN.to_string(),
            column_type: ColumnType::Uuid,
            primary_key: false,
            source: ValueSource::CqId,
        }
    }

    pub(crate) fn cq_parent_id() -> Self {
        Self {
            name: CQ_PARENT_ID_COLUMN.to_string(),
            column_type: ColumnType::Uuid,
            primary_key: false,
            source: ValueSource::CqParentId,
        }
    }

    /// Mark the column as part of the table's primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Convert a raw API value into the column's type.
    ///
    /// Missing values and `null` become `null`. The API encodes 64-bit integers
    /// as strings, so `Int` accepts numeric strings.
    pub fn coerce(&self, value: Option<&Value>) -> Result<Value> {
        let value = match value {
            None | Some(Value::Null) => return Ok(Value::Null),
            Some(v) => v,
        };

        let coerced = match (self.column_type, value) {
            (ColumnType::Json, v) => v.clone(),
            (ColumnType::String, Value::String(s)) => Value::String(s.clone()),
            (ColumnType::String, v) => Value::String(v.to_string()),
            (ColumnType::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Value::Number(n.clone())
            }
            (ColumnType::Int, Value::String(s)) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| anyhow!("column {}: {s:?} is not an integer: {e}", self.name))?,
            (ColumnType::Bool, Value::Bool(b)) => Value::Bool(*b),
            (ColumnType::Bool, Value::String(s)) => s
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|e| anyhow!("column {}: {s:?} is not a bool: {e}", self.name))?,
            (ColumnType::Timestamp, Value::String(s)) => {
                let parsed = DateTime::parse_from_rfc3339(s)
                    .map_err(|e| anyhow!("column {}: {s:?} is not a timestamp: {e}", self.name))?;
                Value::String(
                    parsed
                        .with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                )
            }
            (ColumnType::StringList, Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Value::String(s.clone()),
                        other => Value::String(other.to_string()),
                    })
                    .collect(),
            ),
            (ColumnType::Uuid, Value::String(s)) => uuid::Uuid::parse_str(s)
                .map(|u| Value::String(u.to_string()))
                .map_err(|e| anyhow!("column {}: {s:?} is not a uuid: {e}", self.name))?,
            (column_type, v) => bail!(
                "column {}: cannot convert {v} to {column_type}",
                self.name
            ),
        };

        Ok(coerced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_accepts_numeric_strings() {
        let col = Column::new("size", ColumnType::Int, "/size");
        assert_eq!(
            col.coerce(Some(&json!("21474836480"))).unwrap(),
            json!(21474836480i64)
        );
        assert_eq!(col.coerce(Some(&json!(7))).unwrap(), json!(7));
        assert!(col.coerce(Some(&json!("big"))).is_err());
    }

    #[test]
    fn test_timestamp_is_normalized_to_utc() {
        let col = Column::new("created_at", ColumnType::Timestamp, "/createdAt");
        assert_eq!(
            col.coerce(Some(&json!("2023-04-05T10:11:12+03:00"))).unwrap(),
            json!("2023-04-05T07:11:12.000Z")
        );
        assert!(col.coerce(Some(&json!("yesterday"))).is_err());
    }

    #[test]
    fn test_missing_and_null_become_null() {
        let col = Column::new("name", ColumnType::String, "/name");
        assert_eq!(col.coerce(None).unwrap(), Value::Null);
        assert_eq!(col.coerce(Some(&Value::Null)).unwrap(), Value::Null);
    }

    #[test]
    fn test_string_list_and_json() {
        let col = Column::new("zones", ColumnType::StringList, "/zones");
        assert_eq!(
            col.coerce(Some(&json!(["a", 1]))).unwrap(),
            json!(["a", "1"])
        );

        let col = Column::new("labels", ColumnType::Json, "/labels");
        assert_eq!(
            col.coerce(Some(&json!({"env": "prod"}))).unwrap(),
            json!({"env": "prod"})
        );
    }

    #[test]
    fn test_type_mismatch_names_column() {
        let col = Column::new("deletion_protection", ColumnType::Bool, "/deletionProtection");
        let err = col.coerce(Some(&json!([1, 2]))).unwrap_err();
        assert!(err.to_string().contains("deletion_protection"));
    }
}

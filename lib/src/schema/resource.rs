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

//! Materialization of raw API items into table rows.

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::column::ValueSource;
use super::table::Table;
use crate::message::Record;

/// A resolved API item together with the row built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// The item as returned by the API.
    pub item: Value,
    /// The row emitted to the destination.
    pub record: Record,
    cq_id: Uuid,
}

impl Resource {
    /// Build the row for `item` according to the table's columns.
    ///
    /// With `deterministic_cq_id` the row id is a UUIDv5 of the table name and
    /// primary key values, so repeated syncs produce the same id for the same
    /// object. Otherwise it is random.
    ///
    /// # Errors
    ///
    /// Returns an error if a value does not fit its column type or a primary
    /// key value is missing.
    pub fn materialize(
        table: &Table,
        item: Value,
        parent: Option<&Resource>,
        deterministic_cq_id: bool,
    ) -> Result<Self> {
        let mut values = Map::new();
        for column in &table.columns {
            let value = match &column.source {
                ValueSource::Path(pointer) => column.coerce(item.pointer(pointer))?,
                ValueSource::ParentPath(pointer) => {
                    column.coerce(parent.and_then(|p| p.item.pointer(pointer)))?
                }
                // filled in once the primary key is known
                ValueSource::CqId | ValueSource::CqParentId => Value::Null,
            };
            if column.primary_key && value.is_null() {
                bail!(
                    "table {}: primary key column {} is missing",
                    table.name,
                    column.name
                );
            }
            values.insert(column.name.clone(), value);
        }

        let cq_id = if deterministic_cq_id {
            let mut key = table.name.clone().into_bytes();
            for column in table.primary_keys() {
                key.push(0);
                let value = values.get(&column.name).unwrap_or(&Value::Null);
                key.extend_from_slice(value.to_string().as_bytes());
            }
            Uuid::new_v5(&Uuid::NAMESPACE_OID, &key)
        } else {
            Uuid::new_v4()
        };

        for column in &table.columns {
            match column.source {
                ValueSource::CqId => {
                    values.insert(column.name.clone(), Value::String(cq_id.to_string()));
                }
                ValueSource::CqParentId => {
                    let parent_id = parent
                        .map(|p| Value::String(p.cq_id.to_string()))
                        .unwrap_or(Value::Null);
                    values.insert(column.name.clone(), parent_id);
                }
                _ => {}
            }
        }

        Ok(Self {
            item,
            record: Record {
                table: table.name.clone(),
                values,
            },
            cq_id,
        })
    }

    pub fn cq_id(&self) -> Uuid {
        self.cq_id
    }

    /// Value at a JSON pointer in the raw item.
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.item.pointer(pointer)
    }

    /// String value at a JSON pointer in the raw item.
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.get(pointer).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, TableResolver};
    use crate::client::ClientMeta;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Unused;

    #[async_trait]
    impl TableResolver for Unused {
        async fn resolve(
            &self,
            _client: &dyn ClientMeta,
            _parent: Option<&Resource>,
        ) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
    }

    fn networks() -> Table {
        Table::new("networks", Arc::new(Unused)).with_columns(vec![
            Column::new("id", ColumnType::String, "/id").primary_key(),
            Column::new("name", ColumnType::String, "/name"),
        ])
    }

    fn subnets() -> Table {
        Table::new("subnets", Arc::new(Unused)).with_columns(vec![
            Column::new("id", ColumnType::String, "/id").primary_key(),
            Column::from_parent("network_id", ColumnType::String, "/id"),
        ])
    }

    #[test]
    fn test_deterministic_id_is_stable() {
        let item = json!({"id": "enp1", "name": "default"});
        let a = Resource::materialize(&networks(), item.clone(), None, true).unwrap();
        let b = Resource::materialize(&networks(), item, None, true).unwrap();
        assert_eq!(a.cq_id(), b.cq_id());
        assert_eq!(a.record.get("_cq_id"), Some(&json!(a.cq_id().to_string())));
    }

    #[test]
    fn test_random_id_differs() {
        let item = json!({"id": "enp1"});
        let a = Resource::materialize(&networks(), item.clone(), None, false).unwrap();
        let b = Resource::materialize(&networks(), item, None, false).unwrap();
        assert_ne!(a.cq_id(), b.cq_id());
    }

    #[test]
    fn test_child_links_to_parent() {
        let parent = Resource::materialize(&networks(), json!({"id": "enp1"}), None, true).unwrap();
        let child =
            Resource::materialize(&subnets(), json!({"id": "e9b"}), Some(&parent), true).unwrap();

        assert_eq!(child.record.get("network_id"), Some(&json!("enp1")));
        assert_eq!(
            child.record.get("_cq_parent_id"),
            Some(&json!(parent.cq_id().to_string()))
        );
    }

    #[test]
    fn test_missing_primary_key_fails() {
        let err = Resource::materialize(&networks(), json!({"name": "x"}), None, false)
            .unwrap_err();
        assert!(err.to_string().contains("primary key column id"));
    }
}

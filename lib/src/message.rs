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

//! Messages streamed to the caller during a sync.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::schema::TableSchema;

/// One row of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub table: String,
    pub values: Map<String, Value>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}

/// Output of a sync run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Create or update the destination table before any rows arrive.
    MigrateTable { table: TableSchema },

    /// A row.
    Insert { record: Record },

    /// Rows of `table` written before `sync_time` by earlier runs are stale.
    DeleteStale {
        table: String,
        sync_time: DateTime<Utc>,
    },
}

impl SyncMessage {
    /// Name of the table the message refers to.
    pub fn table_name(&self) -> &str {
        match self {
            SyncMessage::MigrateTable { table } => &table.name,
            SyncMessage::Insert { record } => &record.table,
            SyncMessage::DeleteStale { table, .. } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_serializes_with_type_tag() {
        let mut values = Map::new();
        values.insert("id".to_string(), json!("fd8"));
        let msg = SyncMessage::Insert {
            record: Record {
                table: "yc_compute_disks".to_string(),
                values,
            },
        };

        assert_eq!(msg.table_name(), "yc_compute_disks");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "insert",
                "record": {"table": "yc_compute_disks", "values": {"id": "fd8"}}
            })
        );
    }

    #[test]
    fn test_delete_stale_serialization() {
        let sync_time = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let msg = SyncMessage::DeleteStale {
            table: "yc_vpc_networks".to_string(),
            sync_time,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "delete_stale");
        assert_eq!(value["sync_time"], "2024-01-02T03:04:05Z");
    }
}

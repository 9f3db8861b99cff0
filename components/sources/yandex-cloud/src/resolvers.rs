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

//! Table resolvers built on the list calls of the REST API.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::client::{Client, Service};
use ycsync_lib::client::{downcast_client, ClientMeta};
use ycsync_lib::schema::{Resource, TableResolver};

/// A paginated list call.
#[derive(Debug, Clone, Copy)]
pub struct ListCall {
    pub service: Service,
    pub path: &'static str,
    /// Response field holding the items.
    pub items: &'static str,
}

impl ListCall {
    pub const fn new(service: Service, path: &'static str, items: &'static str) -> Self {
        Self {
            service,
            path,
            items,
        }
    }

    async fn run(&self, client: &Client, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        client
            .list(self.service, self.path, query, self.items)
            .await
    }
}

fn parent_id(parent: &Resource) -> Result<&str> {
    parent
        .get_str("/id")
        .ok_or_else(|| anyhow!("parent row has no id"))
}

/// Everything visible to the credentials, no scoping.
pub struct GlobalList(pub ListCall);

#[async_trait]
impl TableResolver for GlobalList {
    async fn resolve(
        &self,
        client: &dyn ClientMeta,
        _parent: Option<&Resource>,
    ) -> Result<Vec<Value>> {
        let client = downcast_client::<Client>(client)?;
        self.0.run(client, &[]).await
    }
}

/// Items of the client's folder.
pub struct FolderList(pub ListCall);

#[async_trait]
impl TableResolver for FolderList {
    async fn resolve(
        &self,
        client: &dyn ClientMeta,
        _parent: Option<&Resource>,
    ) -> Result<Vec<Value>> {
        let client = downcast_client::<Client>(client)?;
        let folder_id = client.folder_id()?;
        self.0.run(client, &[("folderId", folder_id)]).await
    }
}

/// Folders of the parent cloud, or of the client's cloud without a parent.
pub struct CloudFolders(pub ListCall);

#[async_trait]
impl TableResolver for CloudFolders {
    async fn resolve(
        &self,
        client: &dyn ClientMeta,
        parent: Option<&Resource>,
    ) -> Result<Vec<Value>> {
        let client = downcast_client::<Client>(client)?;
        let cloud_id = match parent {
            Some(cloud) => parent_id(cloud)?,
            None => client.cloud_id()?,
        };
        self.0.run(client, &[("cloudId", cloud_id)]).await
    }
}

/// Items filtered by the id of a parent row, passed as query parameter
/// `param`. Without a parent, the parents are listed in the client's folder
/// first.
pub struct ByParent {
    pub call: ListCall,
    pub param: &'static str,
    pub parents: ListCall,
}

#[async_trait]
impl TableResolver for ByParent {
    async fn resolve(
        &self,
        client: &dyn ClientMeta,
        parent: Option<&Resource>,
    ) -> Result<Vec<Value>> {
        let client = downcast_client::<Client>(client)?;
        if let Some(parent) = parent {
            return self.call.run(client, &[(self.param, parent_id(parent)?)]).await;
        }

        let folder_id = client.folder_id()?;
        let parents = self.parents.run(client, &[("folderId", folder_id)]).await?;
        let mut out = Vec::new();
        for parent in &parents {
            let Some(id) = parent.get("id").and_then(Value::as_str) else {
                continue;
            };
            out.extend(self.call.run(client, &[(self.param, id)]).await?);
        }
        Ok(out)
    }
}

/// Subnets of the parent network, or all subnets of the client's folder.
pub struct NetworkSubnets;

#[async_trait]
impl TableResolver for NetworkSubnets {
    async fn resolve(
        &self,
        client: &dyn ClientMeta,
        parent: Option<&Resource>,
    ) -> Result<Vec<Value>> {
        let client = downcast_client::<Client>(client)?;
        match parent {
            Some(network) => {
                let path = format!("/vpc/v1/networks/{}/subnets", parent_id(network)?);
                client.list(Service::Vpc, &path, &[], "subnets").await
            }
            None => {
                let folder_id = client.folder_id()?;
                client
                    .list(Service::Vpc, "/vpc/v1/subnets", &[("folderId", folder_id)], "subnets")
                    .await
            }
        }
    }
}

/// A folder list that only returns items past the stored cursor.
///
/// The cursor is kept per table and folder in the client's bookmark store and
/// only moves once every returned item became a row.
pub struct IncrementalFolderList {
    pub call: ListCall,
    pub table: &'static str,
    pub cursor_pointer: &'static str,
}

/// Position of an incremental list: the newest timestamp synced and the ids
/// of the items carrying exactly that timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Cursor {
    at: DateTime<Utc>,
    #[serde(default)]
    ids: BTreeSet<String>,
}

impl Cursor {
    /// Read a stored cursor. Plain RFC 3339 timestamps are accepted as a
    /// cursor without ids.
    fn parse(raw: &str) -> Option<Self> {
        if let Ok(cursor) = serde_json::from_str(raw) {
            return Some(cursor);
        }
        DateTime::parse_from_rfc3339(raw).ok().map(|at| Cursor {
            at: at.with_timezone(&Utc),
            ids: BTreeSet::new(),
        })
    }

    /// Whether an item stamped `at` is not synced yet.
    fn admits(&self, at: DateTime<Utc>, id: Option<&str>) -> bool {
        match at.cmp(&self.at) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => id.map_or(true, |id| !self.ids.contains(id)),
            std::cmp::Ordering::Less => false,
        }
    }

    fn advance(&mut self, at: DateTime<Utc>, id: Option<&str>) {
        if at > self.at {
            self.at = at;
            self.ids.clear();
        }
        if at == self.at {
            if let Some(id) = id {
                self.ids.insert(id.to_string());
            }
        }
    }
}

fn timestamp(item: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    item.pointer(pointer)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn item_id(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

/// Move `cursor` past every stamped item. `None` when nothing is stamped.
fn advanced(cursor: Option<Cursor>, items: &[Value], pointer: &str) -> Option<Cursor> {
    items.iter().fold(cursor, |cursor, item| {
        let Some(at) = timestamp(item, pointer) else {
            return cursor;
        };
        let mut cursor = cursor.unwrap_or_else(|| Cursor {
            at,
            ids: BTreeSet::new(),
        });
        cursor.advance(at, item_id(item));
        Some(cursor)
    })
}

impl IncrementalFolderList {
    fn key(&self, client: &Client) -> Result<String> {
        Ok(format!("{}:{}", self.table, client.folder_id()?))
    }

    async fn cursor(&self, meta: &dyn ClientMeta, key: &str) -> Result<Option<Cursor>> {
        let raw = meta
            .state()
            .get_key(key)
            .await
            .with_context(|| format!("failed to read bookmark {key}"))?;
        Ok(raw.and_then(|raw| {
            let cursor = Cursor::parse(&raw);
            if cursor.is_none() {
                warn!("Ignoring unreadable bookmark {key}: {raw}");
            }
            cursor
        }))
    }
}

#[async_trait]
impl TableResolver for IncrementalFolderList {
    async fn resolve(
        &self,
        meta: &dyn ClientMeta,
        _parent: Option<&Resource>,
    ) -> Result<Vec<Value>> {
        let client = downcast_client::<Client>(meta)?;
        let folder_id = client.folder_id()?;
        let key = self.key(client)?;
        let cursor = self.cursor(meta, &key).await?;

        let items = self.call.run(client, &[("folderId", folder_id)]).await?;
        let fresh: Vec<Value> = items
            .into_iter()
            .filter(|item| match (&cursor, timestamp(item, self.cursor_pointer)) {
                (Some(cursor), Some(at)) => cursor.admits(at, item_id(item)),
                _ => true,
            })
            .collect();

        debug!("{} new items for {key} since {cursor:?}", fresh.len());
        Ok(fresh)
    }

    async fn commit(&self, meta: &dyn ClientMeta, items: &[Value]) -> Result<()> {
        let client = downcast_client::<Client>(meta)?;
        let key = self.key(client)?;
        let cursor = self.cursor(meta, &key).await?;

        let Some(next) = advanced(cursor.clone(), items, self.cursor_pointer) else {
            return Ok(());
        };
        if cursor.as_ref() == Some(&next) {
            return Ok(());
        }
        let raw = serde_json::to_string(&next)?;
        meta.state()
            .set_key(&key, &raw)
            .await
            .with_context(|| format!("failed to write bookmark {key}"))?;
        debug!("Bookmark {key} moved to {}", next.at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn snapshot(id: &str, created_at: &str) -> Value {
        json!({"id": id, "createdAt": created_at})
    }

    #[test]
    fn test_items_sharing_the_cursor_time_are_told_apart_by_id() {
        let first = [snapshot("s1", "2024-01-01T00:00:00Z")];
        let cursor = advanced(None, &first, "/createdAt").unwrap();

        let same_time = at("2024-01-01T00:00:00Z");
        assert!(!cursor.admits(same_time, Some("s1")));
        assert!(cursor.admits(same_time, Some("s2")));
        assert!(cursor.admits(at("2024-01-01T00:00:00.001Z"), Some("s1")));
        assert!(!cursor.admits(at("2023-12-31T23:59:59Z"), Some("s3")));
    }

    #[test]
    fn test_advance_keeps_ids_of_the_newest_time_only() {
        let cursor = advanced(
            None,
            &[
                snapshot("s1", "2024-01-01T00:00:00Z"),
                snapshot("s2", "2024-02-01T00:00:00Z"),
                snapshot("s3", "2024-02-01T00:00:00Z"),
            ],
            "/createdAt",
        )
        .unwrap();
        assert_eq!(cursor.at, at("2024-02-01T00:00:00Z"));
        assert_eq!(cursor.ids, BTreeSet::from(["s2".to_string(), "s3".to_string()]));

        // a later call with one more item at the same time extends the set
        let cursor = advanced(
            Some(cursor),
            &[snapshot("s4", "2024-02-01T00:00:00Z")],
            "/createdAt",
        )
        .unwrap();
        assert_eq!(cursor.ids.len(), 3);
    }

    #[test]
    fn test_unstamped_items_leave_the_cursor_alone() {
        assert_eq!(advanced(None, &[json!({"id": "s1"})], "/createdAt"), None);
    }

    #[test]
    fn test_cursor_parsing() {
        let stored = Cursor::parse(r#"{"at":"2024-01-01T00:00:00Z","ids":["s1"]}"#).unwrap();
        assert_eq!(stored.at, at("2024-01-01T00:00:00Z"));
        assert!(stored.ids.contains("s1"));

        let bare = Cursor::parse("2024-01-01T00:00:00+00:00").unwrap();
        assert_eq!(bare.at, at("2024-01-01T00:00:00Z"));
        assert!(bare.ids.is_empty());

        assert_eq!(Cursor::parse("yesterday"), None);
    }
}

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

//! Bookmark store backed by the gRPC state service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;

use super::proto::{GetAllRequest, PutRequest, StateServiceClient};
use super::{StateClient, StateError, StateResult, MAX_MESSAGE_SIZE};

/// Open a channel to `address` (`host:port`) and wait until it is connected.
pub(super) async fn dial(address: &str, connect_timeout: Duration) -> Result<Channel> {
    let uri = format!("http://{address}");
    let channel = Endpoint::from_shared(uri.clone())
        .with_context(|| format!("invalid state backend address {address}"))?
        .connect_timeout(connect_timeout)
        .connect()
        .await
        .with_context(|| format!("failed to dial {uri}"))?;
    info!("Connected to state backend at {address}");
    Ok(channel)
}

fn status_to_error(status: tonic::Status) -> StateError {
    match status.code() {
        Code::Unavailable | Code::Cancelled => StateError::Closed,
        _ => StateError::Rpc(format!("{}: {}", status.code(), status.message())),
    }
}

#[derive(Default)]
struct Bookmarks {
    entries: HashMap<String, String>,
    dirty: HashSet<String>,
}

/// Bookmark store for one table of the remote state backend.
///
/// All bookmarks are read when the client is created; reads are served from
/// memory and writes are sent on [`StateClient::flush`].
pub struct GrpcStateClient {
    client: StateServiceClient,
    table_name: String,
    bookmarks: RwLock<Bookmarks>,
}

impl GrpcStateClient {
    /// Load all bookmarks stored in `table_name`.
    pub async fn new(channel: Channel, table_name: &str) -> StateResult<Self> {
        let mut client = StateServiceClient::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);

        let response = client
            .get_all(GetAllRequest {
                table_name: table_name.to_string(),
            })
            .await
            .map_err(|status| {
                StateError::Rpc(format!(
                    "create state client: {}: {}",
                    status.code(),
                    status.message()
                ))
            })?;

        let entries = response.into_inner().entries;
        debug!(
            "Loaded {} bookmarks from state table {table_name}",
            entries.len()
        );

        Ok(Self {
            client,
            table_name: table_name.to_string(),
            bookmarks: RwLock::new(Bookmarks {
                entries,
                dirty: HashSet::new(),
            }),
        })
    }
}

#[async_trait]
impl StateClient for GrpcStateClient {
    async fn get_key(&self, key: &str) -> StateResult<Option<String>> {
        Ok(self.bookmarks.read().await.entries.get(key).cloned())
    }

    async fn set_key(&self, key: &str, value: &str) -> StateResult<()> {
        let mut bookmarks = self.bookmarks.write().await;
        bookmarks.entries.insert(key.to_string(), value.to_string());
        bookmarks.dirty.insert(key.to_string());
        Ok(())
    }

    async fn flush(&self) -> StateResult<()> {
        let pending: HashMap<String, String> = {
            let bookmarks = self.bookmarks.read().await;
            bookmarks
                .dirty
                .iter()
                .filter_map(|k| bookmarks.entries.get(k).map(|v| (k.clone(), v.clone())))
                .collect()
        };
        if pending.is_empty() {
            return Ok(());
        }

        debug!(
            "Flushing {} bookmarks to state table {}",
            pending.len(),
            self.table_name
        );
        self.client
            .clone()
            .put(PutRequest {
                table_name: self.table_name.clone(),
                entries: pending.clone(),
            })
            .await
            .map_err(status_to_error)?;

        // keys rewritten while the call was in flight stay dirty
        let mut bookmarks = self.bookmarks.write().await;
        for (key, value) in pending {
            if bookmarks.entries.get(&key) == Some(&value) {
                bookmarks.dirty.remove(&key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_maps_to_closed() {
        assert_eq!(
            status_to_error(tonic::Status::unavailable("gone")),
            StateError::Closed
        );
        match status_to_error(tonic::Status::internal("boom")) {
            StateError::Rpc(message) => assert!(message.ends_with(": boom")),
            other => panic!("unexpected {other:?}"),
        }
    }
}

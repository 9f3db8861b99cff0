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

//! Bookmark store for incremental tables.
//!
//! Incremental tables remember how far they got (a cursor per table) between
//! runs. The cursors live in a [`StateClient`]:
//!
//! - **No backend configured**: [`NoOpStateClient`], every lookup misses and
//!   flushing always succeeds.
//! - **Remote backend**: [`GrpcStateClient`], which loads all bookmarks of one
//!   backend table up front and writes changed ones back on [`StateClient::flush`].
//!
//! The variant is chosen once by a [`StateConnector`]; nothing downstream
//! branches on it.
//!
//! # Usage
//!
//! ```ignore
//! let connector = GrpcStateConnector::default();
//! let state = connector.connect(options.backend.as_ref()).await?;
//!
//! let cursor = state.get_key("yc_compute_snapshots").await?;
//! state.set_key("yc_compute_snapshots", "2024-05-01T00:00:00.000Z").await?;
//! state.flush().await?;
//! ```

mod grpc;
pub mod proto;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::SyncError;

pub use grpc::GrpcStateClient;

/// Upper bound for messages sent to or received from the state backend (100 MiB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Errors raised by a bookmark store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The backend could not be reached.
    #[error("state backend unreachable: {0}")]
    Connect(String),

    /// The backend answered a call with an error.
    #[error("state backend call failed: {0}")]
    Rpc(String),

    /// The backend went away during the run.
    #[error("state backend connection closed")]
    Closed,
}

/// Result type for bookmark store operations
pub type StateResult<T> = Result<T, StateError>;

/// Key-value store for incremental sync cursors.
///
/// Keys are table names, values are opaque cursors. Writes may be buffered
/// until [`StateClient::flush`] is called.
#[async_trait]
pub trait StateClient: Send + Sync {
    /// Get the cursor stored under `key`, if any.
    async fn get_key(&self, key: &str) -> StateResult<Option<String>>;

    /// Store a cursor under `key`.
    async fn set_key(&self, key: &str, value: &str) -> StateResult<()>;

    /// Persist buffered writes.
    async fn flush(&self) -> StateResult<()> {
        Ok(())
    }
}

/// Bookmark store used when no backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpStateClient;

#[async_trait]
impl StateClient for NoOpStateClient {
    async fn get_key(&self, _key: &str) -> StateResult<Option<String>> {
        Ok(None)
    }

    async fn set_key(&self, _key: &str, _value: &str) -> StateResult<()> {
        Ok(())
    }
}

/// In-memory bookmark store.
///
/// Keeps cursors for the lifetime of the value and counts flushes. Useful for
/// embedding the scheduler without a backend and for tests.
#[derive(Default)]
pub struct MemoryStateClient {
    entries: RwLock<HashMap<String, String>>,
    flushes: AtomicUsize,
}

impl MemoryStateClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with cursors.
    pub fn with_entries(entries: HashMap<String, String>) -> Self {
        Self {
            entries: RwLock::new(entries),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Number of times [`StateClient::flush`] was called.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Copy of all stored cursors.
    pub async fn entries(&self) -> HashMap<String, String> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl StateClient for MemoryStateClient {
    async fn get_key(&self, key: &str) -> StateResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_key(&self, key: &str, value: &str) -> StateResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn flush(&self) -> StateResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Where bookmarks are stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOptions {
    /// Table in the backend holding this connector's bookmarks.
    pub table_name: String,
    /// `host:port` of the state backend.
    pub connection: String,
}

/// Picks and connects the bookmark store for one sync.
#[async_trait]
pub trait StateConnector: Send + Sync {
    /// Connect to `backend`, or return a no-op store when there is none.
    async fn connect(
        &self,
        backend: Option<&BackendOptions>,
    ) -> crate::error::Result<Arc<dyn StateClient>>;
}

/// [`StateConnector`] for the gRPC state backend.
#[derive(Debug, Clone)]
pub struct GrpcStateConnector {
    connect_timeout: Duration,
}

impl Default for GrpcStateConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl GrpcStateConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl StateConnector for GrpcStateConnector {
    async fn connect(
        &self,
        backend: Option<&BackendOptions>,
    ) -> crate::error::Result<Arc<dyn StateClient>> {
        let Some(backend) = backend else {
            return Ok(Arc::new(NoOpStateClient));
        };

        info!(
            "Connecting to state backend at {} (table {})",
            backend.connection, backend.table_name
        );
        let channel = grpc::dial(&backend.connection, self.connect_timeout)
            .await
            .map_err(|e| SyncError::connection(backend.connection.clone(), e))?;

        let client = GrpcStateClient::new(channel, &backend.table_name)
            .await
            .map_err(SyncError::State)?;
        Ok(Arc::new(client))
    }
}

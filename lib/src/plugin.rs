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

//! The interface a host uses to drive a source connector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::SyncMessage;
use crate::schema::Tables;
use crate::state::BackendOptions;

/// Options for constructing a connector client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewClientOptions {
    /// Build a client that can only list tables. The spec is not read and no
    /// network connection is made.
    pub no_connection: bool,
}

/// Options of a table listing call. Listing always returns the full registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOptions {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub skip_tables: Vec<String>,
    #[serde(default)]
    pub skip_dependent_tables: bool,
}

/// Options of a sync call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Glob patterns of tables to sync. Empty means all tables.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Glob patterns of tables to leave out, with their descendants.
    #[serde(default)]
    pub skip_tables: Vec<String>,
    /// Do not pull in children of selected tables, and allow a selected child
    /// to run without its parent.
    #[serde(default)]
    pub skip_dependent_tables: bool,
    /// Derive `_cq_id` from the primary key instead of generating it.
    #[serde(default)]
    pub deterministic_cq_id: bool,
    /// Remote bookmark store. Bookmarks are not persisted when absent.
    #[serde(default)]
    pub backend: Option<BackendOptions>,
}

/// A source connector as seen by its host.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// The full static table forest, unfiltered.
    async fn tables(&self, options: &TableOptions) -> Result<Tables>;

    /// Run a sync, streaming messages into `sink`.
    async fn sync(&self, options: SyncOptions, sink: mpsc::Sender<SyncMessage>) -> Result<()>;

    /// Release held resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

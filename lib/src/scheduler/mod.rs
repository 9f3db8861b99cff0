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

//! Execution of a sync over a table forest.

mod table_scheduler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::client::ClientMeta;
use crate::error::Result;
use crate::message::SyncMessage;
use crate::schema::Tables;

pub use table_scheduler::TableScheduler;

/// Order in which pending resolver work is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Children of a resolved row run before pending siblings.
    #[default]
    Dfs,
    /// Root work alternates between multiplexed clients.
    RoundRobin,
    /// Root work runs in random order.
    Shuffle,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Dfs => write!(f, "dfs"),
            Strategy::RoundRobin => write!(f, "round-robin"),
            Strategy::Shuffle => write!(f, "shuffle"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dfs" => Ok(Strategy::Dfs),
            "round-robin" => Ok(Strategy::RoundRobin),
            "shuffle" => Ok(Strategy::Shuffle),
            other => Err(format!(
                "unknown scheduler strategy {other}, expected one of dfs, round-robin, shuffle"
            )),
        }
    }
}

/// Settings shared by every run of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Maximum number of resolver calls in flight.
    pub concurrency: usize,
    pub strategy: Strategy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: 10_000,
            strategy: Strategy::Dfs,
        }
    }
}

/// Counters collected during a run, per table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub resources: BTreeMap<String, usize>,
    pub errors: BTreeMap<String, usize>,
}

impl SyncSummary {
    pub fn record_resources(&mut self, table: &str, count: usize) {
        *self.resources.entry(table.to_string()).or_default() += count;
    }

    pub fn record_error(&mut self, table: &str) {
        *self.errors.entry(table.to_string()).or_default() += 1;
    }

    pub fn resources_for(&self, table: &str) -> usize {
        self.resources.get(table).copied().unwrap_or(0)
    }

    pub fn errors_for(&self, table: &str) -> usize {
        self.errors.get(table).copied().unwrap_or(0)
    }

    pub fn total_resources(&self) -> usize {
        self.resources.values().sum()
    }

    pub fn total_errors(&self) -> usize {
        self.errors.values().sum()
    }
}

/// Runs a sync of a filtered table forest.
///
/// Implementations emit a `MigrateTable` message per table before any rows,
/// then the rows. Failures of single tables are reported in the summary; an
/// `Err` means the run as a whole failed.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sync(
        &self,
        client: Arc<dyn ClientMeta>,
        tables: &Tables,
        deterministic_cq_id: bool,
        sink: mpsc::Sender<SyncMessage>,
    ) -> Result<SyncSummary>;
}

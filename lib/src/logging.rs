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

use log::{error, info, warn};

use crate::scheduler::SyncSummary;

pub fn log_sync_start(source: &str, tables: usize) {
    info!("Starting sync of {source}: {tables} tables");
}

pub fn log_sync_stop(source: &str, summary: &SyncSummary) {
    info!(
        "Finished sync of {source}: {} resources, {} errors",
        summary.total_resources(),
        summary.total_errors()
    );
}

pub fn log_sync_error(source: &str, error: &str) {
    error!("Sync of {source} failed: {error}");
}

pub fn log_table_error(table: &str, client: &str, error: &str) {
    warn!("Table {table} (client {client}) failed: {error}");
}

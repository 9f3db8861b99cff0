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

// ============================================================================
// Core Public Modules
// ============================================================================

/// API client view shared by the scheduler and resolvers
pub mod client;

/// Configuration values resolved from the environment
pub mod config_value;

/// Error types for ycsync-lib
pub mod error;

/// Messages streamed to the host during a sync
pub mod message;

/// Host-facing connector interface
pub mod plugin;

/// Scheduler trait and the bounded-concurrency table scheduler
pub mod scheduler;

/// Tables, columns and the table forest filter
pub mod schema;

/// Bookmark stores for incremental tables
pub mod state;

/// The filter / connect / schedule / flush pipeline
pub mod sync;

#[cfg_attr(not(test), doc(hidden))]
pub mod logging;

// ============================================================================
// Clean Public API
// ============================================================================

pub use client::{downcast_client, ClientMeta};
pub use config_value::{ConfigValue, ConfigValueString, ResolverError};
pub use error::{FilterError, Result, SyncError};
pub use message::{Record, SyncMessage};
pub use plugin::{NewClientOptions, SourceClient, SyncOptions, TableOptions};
pub use scheduler::{Scheduler, SchedulerOptions, Strategy, SyncSummary, TableScheduler};
pub use schema::{Column, ColumnType, Resource, Table, TableResolver, TableSchema, Tables};
pub use state::{
    BackendOptions, GrpcStateConnector, MemoryStateClient, NoOpStateClient, StateClient,
    StateConnector, StateError,
};
pub use sync::run_sync;

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

//! Yandex Cloud source connector for ycsync.
//!
//! Extracts resources of the Yandex Cloud REST APIs (clouds, folders, compute,
//! VPC, IAM, Object Storage, KMS) as tables and streams them to a host as
//! [`SyncMessage`](ycsync_lib::message::SyncMessage)s.
//!
//! # Configuration
//!
//! | Field | Type | Default | Description |
//! |-------|------|---------|-------------|
//! | `credentials` | [`Credentials`] | required | `iam_token`, `oauth_token` or `metadata_service` |
//! | `cloud_ids` | `[string]` | all visible | Clouds to discover folders in |
//! | `folder_ids` | `[string]` | discovered | Folders to sync |
//! | `endpoint` | `string` | public API | Base URL used for every service |
//! | `concurrency` | `usize` | `10000` | Resolver calls in flight (must be > 0) |
//! | `scheduler` | `dfs` \| `round-robin` \| `shuffle` | `dfs` | Scheduling strategy |
//! | `max_retries` | `u32` | `3` | Retries of throttled or failed requests (0-10) |
//! | `page_size` | `u32` | `1000` | Page size of list calls (1-1000) |
//! | `request_timeout_secs` | `u64` | `60` | Per request timeout |
//!
//! # Example Configuration (YAML)
//!
//! ```yaml
//! credentials:
//!   type: oauth_token
//!   token: ${YC_OAUTH_TOKEN}
//! folder_ids: [b1gexample]
//! concurrency: 200
//! scheduler: round-robin
//! ```
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use ycsync_lib::plugin::{NewClientOptions, SourceClient, SyncOptions};
//! use ycsync_source_yandex_cloud::YandexCloudPlugin;
//!
//! let plugin = YandexCloudPlugin::new(&spec_bytes, NewClientOptions::default()).await?;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(1024);
//! tokio::spawn(async move { while let Some(msg) = rx.recv().await { /* write */ } });
//! plugin.sync(SyncOptions::default(), tx).await?;
//! plugin.close().await?;
//! ```

pub mod auth;
pub mod client;
mod plugin;
mod resolvers;
pub mod spec;
pub mod tables;

pub use client::Client;
pub use plugin::YandexCloudPlugin;
pub use spec::{Credentials, Spec};
pub use tables::tables;

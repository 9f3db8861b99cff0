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

use async_trait::async_trait;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::client::Client;
use crate::spec::Spec;
use crate::tables::tables;
use ycsync_lib::client::ClientMeta;
use ycsync_lib::error::{Result, SyncError};
use ycsync_lib::message::SyncMessage;
use ycsync_lib::plugin::{NewClientOptions, SourceClient, SyncOptions, TableOptions};
use ycsync_lib::scheduler::TableScheduler;
use ycsync_lib::schema::Tables;
use ycsync_lib::state::{GrpcStateConnector, StateConnector};
use ycsync_lib::sync::run_sync;

struct Connected {
    client: Arc<dyn ClientMeta>,
    scheduler: TableScheduler,
    connector: Arc<dyn StateConnector>,
}

/// The Yandex Cloud source connector.
pub struct YandexCloudPlugin {
    options: NewClientOptions,
    all_tables: Tables,
    connected: Option<Connected>,
    closed: AtomicBool,
}

impl YandexCloudPlugin {
    /// Build the connector from spec bytes.
    ///
    /// With `no_connection` the bytes are not parsed and only table listing works.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Config`] for an invalid spec
    /// - [`SyncError::Connection`] when authentication or folder discovery fails
    pub async fn new(spec: &[u8], options: NewClientOptions) -> Result<Self> {
        let all_tables = tables();
        if options.no_connection {
            debug!("Creating Yandex Cloud plugin without a connection");
            return Ok(Self {
                options,
                all_tables,
                connected: None,
                closed: AtomicBool::new(false),
            });
        }

        let spec = Spec::from_bytes(spec)?;
        let client = Client::new(&spec).await?;
        let scheduler = TableScheduler::new(spec.scheduler_options());
        info!(
            "Yandex Cloud plugin created: concurrency {}, scheduler {}",
            spec.concurrency, spec.scheduler
        );

        Ok(Self {
            options,
            all_tables,
            connected: Some(Connected {
                client: Arc::new(client),
                scheduler,
                connector: Arc::new(GrpcStateConnector::new()),
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Replace how bookmark stores are obtained for sync runs.
    pub fn with_state_connector(mut self, connector: Arc<dyn StateConnector>) -> Self {
        if let Some(connected) = self.connected.as_mut() {
            connected.connector = connector;
        }
        self
    }

    pub fn options(&self) -> NewClientOptions {
        self.options
    }
}

#[async_trait]
impl SourceClient for YandexCloudPlugin {
    async fn tables(&self, _options: &TableOptions) -> Result<Tables> {
        Ok(self.all_tables.clone())
    }

    async fn sync(&self, options: SyncOptions, sink: mpsc::Sender<SyncMessage>) -> Result<()> {
        let Some(connected) = &self.connected else {
            return Err(SyncError::unsupported("Client.NoConnection is not supported"));
        };
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::unsupported("client is closed"));
        }

        run_sync(
            &connected.scheduler,
            &connected.client,
            &self.all_tables,
            &options,
            connected.connector.as_ref(),
            sink,
        )
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Yandex Cloud plugin closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn offline() -> YandexCloudPlugin {
        YandexCloudPlugin::new(b"", NewClientOptions { no_connection: true })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_connection_lists_full_registry() {
        let plugin = offline().await;
        let listed = plugin
            .tables(&TableOptions {
                tables: vec!["yc_compute_*".to_string()],
                skip_tables: vec!["yc_compute_disks".to_string()],
                skip_dependent_tables: true,
            })
            .await
            .unwrap();
        assert_eq!(listed.names(), tables().names());
    }

    #[tokio::test]
    async fn test_no_connection_sync_is_unsupported() {
        let plugin = offline().await;
        let (tx, _rx) = mpsc::channel(1);
        let err = plugin.sync(SyncOptions::default(), tx).await.unwrap_err();
        assert!(matches!(err, SyncError::Unsupported { .. }));
        assert!(err.to_string().contains("Client.NoConnection is not supported"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let plugin = offline().await;
        plugin.close().await.unwrap();
        plugin.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_spec_fails_before_network() {
        let err = YandexCloudPlugin::new(br#"{"concurrency": 0}"#, NewClientOptions::default())
            .await
            .err()
            .unwrap();
        assert!(err.is_config());
    }
}

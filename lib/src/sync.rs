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

//! The sync pipeline: filter, connect bookmarks, schedule, flush.

use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::client::ClientMeta;
use crate::error::{Result, SyncError};
use crate::logging::{log_sync_error, log_sync_start, log_sync_stop};
use crate::message::SyncMessage;
use crate::plugin::SyncOptions;
use crate::scheduler::{Scheduler, SyncSummary};
use crate::schema::Tables;
use crate::state::StateConnector;

/// Run one sync of `all_tables` restricted by `options`.
///
/// The table selection is checked before anything is dialed. Bookmarks are
/// flushed once after the scheduler finishes; when the scheduler itself fails
/// its error is returned and nothing is flushed.
///
/// # Errors
///
/// - [`SyncError::Filter`] for an inconsistent table selection
/// - [`SyncError::Connection`] or [`SyncError::State`] when the bookmark store
///   cannot be set up
/// - whatever the scheduler returns
/// - [`SyncError::Flush`] when bookmarks cannot be persisted
pub async fn run_sync(
    scheduler: &dyn Scheduler,
    client: &Arc<dyn ClientMeta>,
    all_tables: &Tables,
    options: &SyncOptions,
    connector: &dyn StateConnector,
    sink: mpsc::Sender<SyncMessage>,
) -> Result<SyncSummary> {
    let tables = all_tables.filter_dfs(
        &options.tables,
        &options.skip_tables,
        options.skip_dependent_tables,
    )?;
    debug!("Selected tables: {:?}", tables.names());

    let state = connector.connect(options.backend.as_ref()).await?;
    let bound = client.with_state(state.clone());

    let source = client.id();
    log_sync_start(&source, tables.flatten().len());

    let summary = match scheduler
        .sync(bound, &tables, options.deterministic_cq_id, sink)
        .await
    {
        Ok(summary) => summary,
        Err(e) => {
            log_sync_error(&source, &e.to_string());
            return Err(e);
        }
    };

    state.flush().await.map_err(SyncError::Flush)?;
    log_sync_stop(&source, &summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::schema::{Column, ColumnType, Resource, Table, TableResolver};
    use crate::state::{
        BackendOptions, GrpcStateConnector, MemoryStateClient, StateClient, StateError,
        StateResult,
    };
    use async_trait::async_trait;
    use serde_json::Value;
    use std::any::Any;
    use std::sync::Mutex;

    struct TestClient {
        state: Arc<dyn StateClient>,
    }

    impl ClientMeta for TestClient {
        fn id(&self) -> String {
            "test".to_string()
        }

        fn state(&self) -> Arc<dyn StateClient> {
            self.state.clone()
        }

        fn with_state(&self, state: Arc<dyn StateClient>) -> Arc<dyn ClientMeta> {
            Arc::new(TestClient { state })
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn client() -> Arc<dyn ClientMeta> {
        Arc::new(TestClient {
            state: Arc::new(crate::state::NoOpStateClient),
        })
    }

    struct Nothing;

    #[async_trait]
    impl TableResolver for Nothing {
        async fn resolve(
            &self,
            _client: &dyn ClientMeta,
            _parent: Option<&Resource>,
        ) -> anyhow::Result<Vec<Value>> {
            Ok(Vec::new())
        }
    }

    fn table(name: &str) -> Table {
        Table::new(name, Arc::new(Nothing))
            .with_columns(vec![Column::new("id", ColumnType::String, "/id").primary_key()])
    }

    /// `{A, B(parent=A), C}`
    fn abc() -> Tables {
        Tables::new(vec![table("A").with_relation(table("B")), table("C")])
    }

    /// Records the tables it was asked to run and writes a bookmark.
    #[derive(Default)]
    struct StubScheduler {
        runs: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl StubScheduler {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn runs(&self) -> Vec<Vec<String>> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Scheduler for StubScheduler {
        async fn sync(
            &self,
            client: Arc<dyn ClientMeta>,
            tables: &Tables,
            _deterministic_cq_id: bool,
            _sink: mpsc::Sender<SyncMessage>,
        ) -> Result<SyncSummary> {
            self.runs.lock().unwrap().push(tables.names());
            client
                .state()
                .set_key("last_run", "now")
                .await
                .map_err(SyncError::State)?;
            if self.fail {
                return Err(SyncError::scheduler(anyhow::anyhow!("worker pool exploded")));
            }
            Ok(SyncSummary::default())
        }
    }

    /// Hands out one shared in-memory store and remembers what it was asked for.
    #[derive(Default)]
    struct RecordingConnector {
        state: Arc<MemoryStateClient>,
        requests: Mutex<Vec<Option<BackendOptions>>>,
    }

    #[async_trait]
    impl StateConnector for RecordingConnector {
        async fn connect(
            &self,
            backend: Option<&BackendOptions>,
        ) -> Result<Arc<dyn StateClient>> {
            self.requests.lock().unwrap().push(backend.cloned());
            Ok(self.state.clone())
        }
    }

    struct BrokenFlush;

    #[async_trait]
    impl StateClient for BrokenFlush {
        async fn get_key(&self, _key: &str) -> StateResult<Option<String>> {
            Ok(None)
        }

        async fn set_key(&self, _key: &str, _value: &str) -> StateResult<()> {
            Ok(())
        }

        async fn flush(&self) -> StateResult<()> {
            Err(StateError::Rpc("unavailable".to_string()))
        }
    }

    struct BrokenFlushConnector;

    #[async_trait]
    impl StateConnector for BrokenFlushConnector {
        async fn connect(
            &self,
            _backend: Option<&BackendOptions>,
        ) -> Result<Arc<dyn StateClient>> {
            Ok(Arc::new(BrokenFlush))
        }
    }

    fn options(tables: &[&str], skip_dependent_tables: bool) -> SyncOptions {
        SyncOptions {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            skip_dependent_tables,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_without_backend_flushes_once() {
        let scheduler = StubScheduler::default();
        let connector = RecordingConnector::default();
        let (tx, _rx) = mpsc::channel(8);

        run_sync(&scheduler, &client(), &abc(), &options(&[], false), &connector, tx)
            .await
            .unwrap();

        assert_eq!(scheduler.runs(), vec![vec!["A", "B", "C"]]);
        assert_eq!(*connector.requests.lock().unwrap(), vec![None]);
        assert_eq!(connector.state.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_sees_bound_state() {
        let scheduler = StubScheduler::default();
        let connector = RecordingConnector::default();
        let (tx, _rx) = mpsc::channel(8);

        run_sync(&scheduler, &client(), &abc(), &options(&[], false), &connector, tx)
            .await
            .unwrap();

        let entries = connector.state.entries().await;
        assert_eq!(entries.get("last_run").map(String::as_str), Some("now"));
    }

    #[tokio::test]
    async fn test_missing_ancestor_fails_before_scheduling() {
        let scheduler = StubScheduler::default();
        let connector = RecordingConnector::default();
        let (tx, _rx) = mpsc::channel(8);

        let err = run_sync(&scheduler, &client(), &abc(), &options(&["B"], false), &connector, tx)
            .await
            .unwrap_err();

        match err {
            SyncError::Filter(FilterError::MissingAncestor { table, ancestor }) => {
                assert_eq!(table, "B");
                assert_eq!(ancestor, "A");
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(scheduler.runs().is_empty());
        assert!(connector.requests.lock().unwrap().is_empty());
        assert_eq!(connector.state.flush_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_dependent_runs_child_alone() {
        let scheduler = StubScheduler::default();
        let connector = RecordingConnector::default();
        let (tx, _rx) = mpsc::channel(8);

        run_sync(&scheduler, &client(), &abc(), &options(&["B"], true), &connector, tx)
            .await
            .unwrap();

        assert_eq!(scheduler.runs(), vec![vec!["B"]]);
        assert_eq!(connector.state.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_before_scheduling() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let scheduler = StubScheduler::default();
        let connector =
            GrpcStateConnector::new().with_connect_timeout(std::time::Duration::from_secs(2));
        let mut opts = options(&[], false);
        opts.backend = Some(BackendOptions {
            table_name: "cq_state_yc".to_string(),
            connection: address,
        });
        let (tx, _rx) = mpsc::channel(8);

        let err = run_sync(&scheduler, &client(), &abc(), &opts, &connector, tx)
            .await
            .unwrap_err();
        assert!(err.is_connection());
        assert!(scheduler.runs().is_empty());
    }

    #[tokio::test]
    async fn test_scheduler_failure_skips_flush() {
        let scheduler = StubScheduler::failing();
        let connector = RecordingConnector::default();
        let (tx, _rx) = mpsc::channel(8);

        let err = run_sync(&scheduler, &client(), &abc(), &options(&[], false), &connector, tx)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Scheduler(_)));
        assert_eq!(connector.state.flush_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_failure_fails_sync() {
        let scheduler = StubScheduler::default();
        let (tx, _rx) = mpsc::channel(8);

        let err = run_sync(
            &scheduler,
            &client(),
            &abc(),
            &options(&[], false),
            &BrokenFlushConnector,
            tx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Flush(StateError::Rpc(_))));
        assert_eq!(scheduler.runs().len(), 1);
    }
}

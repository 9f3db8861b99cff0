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

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::{Scheduler, SchedulerOptions, Strategy, SyncSummary};
use crate::client::ClientMeta;
use crate::error::{Result, SyncError};
use crate::logging::log_table_error;
use crate::message::SyncMessage;
use crate::schema::{Resource, Table, Tables};

/// One resolver call: a table, the client to use and the parent row.
struct Job {
    table: Arc<Table>,
    client: Arc<dyn ClientMeta>,
    parent: Option<Arc<Resource>>,
}

struct Outcome {
    job: Job,
    items: anyhow::Result<Vec<anyhow::Result<Resource>>>,
}

async fn run_job(job: Job, deterministic_cq_id: bool) -> Outcome {
    let resolved = job
        .table
        .resolver
        .resolve(job.client.as_ref(), job.parent.as_deref())
        .await;

    let items = resolved.map(|items| {
        items
            .into_iter()
            .map(|item| {
                Resource::materialize(&job.table, item, job.parent.as_deref(), deterministic_cq_id)
            })
            .collect()
    });
    Outcome { job, items }
}

/// Scheduler resolving tables with a bounded number of concurrent calls.
///
/// Work starts with one job per root table and client (after multiplexing).
/// Every resolved row of a table with relations queues one job per child
/// table, bound to the same client and with the row as parent.
///
/// Dropping the future returned by [`Scheduler::sync`] aborts all resolver
/// calls in flight.
#[derive(Debug, Clone, Default)]
pub struct TableScheduler {
    options: SchedulerOptions,
}

impl TableScheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    fn root_jobs(&self, client: &Arc<dyn ClientMeta>, tables: &Tables) -> VecDeque<Job> {
        let mut jobs: Vec<Job> = Vec::new();
        for table in tables {
            let clients = match table.multiplex {
                Some(multiplex) => multiplex(client),
                None => vec![client.clone()],
            };
            if clients.is_empty() {
                debug!("Table {} has no clients to sync with", table.name);
            }
            for c in clients {
                jobs.push(Job {
                    table: table.clone(),
                    client: c,
                    parent: None,
                });
            }
        }

        match self.options.strategy {
            Strategy::Dfs => jobs.into(),
            Strategy::Shuffle => {
                jobs.shuffle(&mut rand::thread_rng());
                jobs.into()
            }
            Strategy::RoundRobin => {
                let mut by_client: BTreeMap<String, VecDeque<Job>> = BTreeMap::new();
                for job in jobs {
                    by_client.entry(job.client.id()).or_default().push_back(job);
                }
                let mut ordered = VecDeque::new();
                while !by_client.is_empty() {
                    by_client.retain(|_, pending| match pending.pop_front() {
                        Some(job) => {
                            ordered.push_back(job);
                            true
                        }
                        None => false,
                    });
                }
                ordered
            }
        }
    }
}

async fn emit(sink: &mpsc::Sender<SyncMessage>, message: SyncMessage) -> Result<()> {
    sink.send(message)
        .await
        .map_err(|_| SyncError::scheduler(anyhow!("sync message receiver was dropped")))
}

#[async_trait]
impl Scheduler for TableScheduler {
    async fn sync(
        &self,
        client: Arc<dyn ClientMeta>,
        tables: &Tables,
        deterministic_cq_id: bool,
        sink: mpsc::Sender<SyncMessage>,
    ) -> Result<SyncSummary> {
        let sync_time = Utc::now();
        let concurrency = self.options.concurrency.max(1);
        let mut summary = SyncSummary::default();

        let all_tables = tables.flatten();
        for table in &all_tables {
            emit(
                &sink,
                SyncMessage::MigrateTable {
                    table: table.schema(),
                },
            )
            .await?;
        }

        let mut queue = self.root_jobs(&client, tables);
        info!(
            "Scheduling {} root jobs with strategy {} and concurrency {concurrency}",
            queue.len(),
            self.options.strategy
        );

        let mut tasks = JoinSet::new();
        loop {
            while tasks.len() < concurrency {
                let Some(job) = queue.pop_front() else {
                    break;
                };
                tasks.spawn(run_job(job, deterministic_cq_id));
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let Outcome { job, items } = joined
                .map_err(|e| SyncError::scheduler(anyhow!("resolver task failed: {e}")))?;

            let items = match items {
                Ok(items) => items,
                Err(e) => {
                    log_table_error(&job.table.name, &job.client.id(), &format!("{e:#}"));
                    summary.record_error(&job.table.name);
                    continue;
                }
            };

            let mut children = Vec::new();
            let mut committed = Vec::new();
            let mut count = 0;
            let mut failed = 0;
            for item in items {
                let resource = match item {
                    Ok(resource) => resource,
                    Err(e) => {
                        log_table_error(&job.table.name, &job.client.id(), &format!("{e:#}"));
                        summary.record_error(&job.table.name);
                        failed += 1;
                        continue;
                    }
                };
                count += 1;
                if job.table.is_incremental {
                    committed.push(resource.item.clone());
                }

                if job.table.relations.is_empty() {
                    emit(&sink, SyncMessage::Insert { record: resource.record }).await?;
                    continue;
                }

                emit(
                    &sink,
                    SyncMessage::Insert {
                        record: resource.record.clone(),
                    },
                )
                .await?;
                let parent = Arc::new(resource);
                for child in &job.table.relations {
                    children.push(Job {
                        table: child.clone(),
                        client: job.client.clone(),
                        parent: Some(parent.clone()),
                    });
                }
            }
            summary.record_resources(&job.table.name, count);

            if job.table.is_incremental {
                if failed > 0 {
                    debug!(
                        "Not committing {} for {}: {failed} rows failed",
                        job.table.name,
                        job.client.id()
                    );
                } else if let Err(e) = job
                    .table
                    .resolver
                    .commit(job.client.as_ref(), &committed)
                    .await
                {
                    log_table_error(&job.table.name, &job.client.id(), &format!("{e:#}"));
                    summary.record_error(&job.table.name);
                }
            }

            match self.options.strategy {
                Strategy::Dfs => {
                    for child in children.into_iter().rev() {
                        queue.push_front(child);
                    }
                }
                Strategy::RoundRobin | Strategy::Shuffle => queue.extend(children),
            }
        }

        for table in &all_tables {
            if table.is_incremental || summary.errors_for(&table.name) > 0 {
                continue;
            }
            emit(
                &sink,
                SyncMessage::DeleteStale {
                    table: table.name.clone(),
                    sync_time,
                },
            )
            .await?;
        }

        Ok(summary)
    }
}

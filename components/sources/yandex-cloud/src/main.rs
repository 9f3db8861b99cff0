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

//! Command line runner of the Yandex Cloud connector.
//!
//! ```bash
//! ycsync-yandex-cloud tables
//! ycsync-yandex-cloud sync --spec spec.yaml --tables 'yc_compute_*' > out.jsonl
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use ycsync_lib::message::SyncMessage;
use ycsync_lib::plugin::{NewClientOptions, SourceClient, SyncOptions, TableOptions};
use ycsync_lib::state::BackendOptions;
use ycsync_source_yandex_cloud::YandexCloudPlugin;

#[derive(Parser, Debug)]
#[command(name = "ycsync-yandex-cloud")]
#[command(version, about = "Sync Yandex Cloud resources as JSON lines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the table schemas
    Tables {
        /// Connector spec, JSON or YAML. Not needed to list tables.
        #[arg(short, long)]
        spec: Option<PathBuf>,
    },

    /// Run a sync and print messages to stdout
    Sync(SyncArgs),
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Connector spec, JSON or YAML
    #[arg(short, long)]
    spec: PathBuf,

    /// Table patterns to sync (default: all)
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Table patterns to leave out
    #[arg(long, value_delimiter = ',')]
    skip_tables: Vec<String>,

    #[arg(long)]
    skip_dependent_tables: bool,

    #[arg(long)]
    deterministic_cq_id: bool,

    /// Address of the state backend, e.g. localhost:7777
    #[arg(long, requires = "backend_table")]
    backend_connection: Option<String>,

    /// Table the state backend keeps bookmarks in
    #[arg(long, requires = "backend_connection")]
    backend_table: Option<String>,
}

impl SyncArgs {
    fn options(&self) -> SyncOptions {
        let backend = match (&self.backend_connection, &self.backend_table) {
            (Some(connection), Some(table_name)) => Some(BackendOptions {
                table_name: table_name.clone(),
                connection: connection.clone(),
            }),
            _ => None,
        };
        SyncOptions {
            tables: self.tables.clone(),
            skip_tables: self.skip_tables.clone(),
            skip_dependent_tables: self.skip_dependent_tables,
            deterministic_cq_id: self.deterministic_cq_id,
            backend,
        }
    }
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.target(env_logger::Target::Stderr).init();
}

/// Read a spec file as JSON bytes. YAML is accepted as well.
fn read_spec(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read spec {}", path.display()))?;
    let value: serde_json::Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse spec {}", path.display()))?;
    Ok(serde_json::to_vec(&value)?)
}

async fn list_tables(spec: Option<PathBuf>) -> Result<()> {
    let plugin = match spec {
        Some(path) => {
            let spec = read_spec(&path)?;
            YandexCloudPlugin::new(&spec, NewClientOptions::default()).await?
        }
        None => YandexCloudPlugin::new(b"", NewClientOptions { no_connection: true }).await?,
    };
    let tables = plugin.tables(&TableOptions::default()).await?;

    let mut out = std::io::stdout().lock();
    for table in tables.flatten() {
        serde_json::to_writer(&mut out, &table.schema())?;
        writeln!(out)?;
    }
    plugin.close().await?;
    Ok(())
}

async fn run_sync(args: SyncArgs) -> Result<()> {
    let spec = read_spec(&args.spec)?;
    let plugin = YandexCloudPlugin::new(&spec, NewClientOptions::default()).await?;
    let (tx, mut rx) = mpsc::channel::<SyncMessage>(1024);

    let writer = tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut out = std::io::BufWriter::new(std::io::stdout().lock());
        let mut written = 0;
        while let Some(message) = rx.blocking_recv() {
            serde_json::to_writer(&mut out, &message)?;
            writeln!(out)?;
            written += 1;
        }
        out.flush()?;
        Ok(written)
    });

    let result = tokio::select! {
        result = plugin.sync(args.options(), tx) => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling sync");
            Err(anyhow::anyhow!("sync cancelled"))
        }
    };

    let written = writer.await.context("output writer panicked")??;
    plugin.close().await?;
    result?;
    info!("Wrote {written} messages");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Command::Tables { spec } => list_tables(spec).await,
        Command::Sync(args) => run_sync(args).await,
    }
}

//  Copyright 2026 the phonedb authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use phonedb::{server, AppState, CorpusFiles, Database, DatabaseConfig, WorkerBudget};

/// In-memory sharded phonebook database served over HTTP.
#[derive(Debug, Parser)]
#[command(name = "phonedb", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Phone-number digits selecting the shard; the store holds
    /// 10^first-digits shards per activity array.
    #[arg(long, default_value_t = 4)]
    first_digits: u32,

    /// Phone-number digits keying the shard's inner map; must complement
    /// first-digits to 10.
    #[arg(long, default_value_t = 6)]
    second_digits: u32,

    /// Default bound for gate waits, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    wait_time_ms: u64,

    /// Process-wide cap on worker threads servicing requests.
    #[arg(long, default_value_t = WorkerBudget::DEFAULT_CAP)]
    max_workers: u32,

    /// Directory holding the six name-corpus files.
    #[arg(long, default_value = ".")]
    corpus_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let db = Database::new(DatabaseConfig {
        first_digits: args.first_digits,
        second_digits: args.second_digits,
        wait_time_ms: args.wait_time_ms,
    })
    .context("building the database")?;

    let state = AppState::new(
        db,
        WorkerBudget::new(args.max_workers),
        CorpusFiles::in_dir(&args.corpus_dir),
    );

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, "phonedb serving");
    server::serve(listener, state).await.context("serving")?;
    Ok(())
}

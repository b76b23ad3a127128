// Copyright 2026 Daniel Pelikan
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

//! Message access session manager daemon.
//!
//! Reads bridge input as JSON lines on stdin and writes bridge output as
//! JSON lines on stdout. Logs go to stderr.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mapm_manager::bridge::{BridgeOutput, StdioBridge};
use mapm_manager::config::Config;
use mapm_manager::MapManager;

fn config_path() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => Ok(None),
        Some("--config") => {
            let path = args.next().context("--config needs a path")?;
            Ok(Some(PathBuf::from(path)))
        }
        Some(other) => bail!("Unknown argument: {}", other),
    }
}

async fn write_output(mut rx: mpsc::UnboundedReceiver<BridgeOutput>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(output) = rx.recv().await {
        let mut line = serde_json::to_string(&output)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match config_path()? {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid log filter")?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("Starting mapmd v{}...", env!("CARGO_PKG_VERSION"));

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_output(rx));

    let bridge = Arc::new(StdioBridge::new(tx, config.bridge.max_packet_size));
    let manager = MapManager::new(config.manager, bridge.clone(), bridge.clone(), bridge.clone());
    info!("Ready. Waiting for bridge input.");

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = bridge.run(&manager, stdin) => {
            if let Err(e) = result {
                error!("Bridge input failed: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    manager.shutdown();
    drop(manager);
    drop(bridge);
    writer.await.context("Output writer panicked")??;

    info!("mapmd stopped");
    Ok(())
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Opens SQLite storage, wires the restore/persist adapters, and runs the
//! HTTP gateway until SIGINT or SIGTERM.

use std::sync::Arc;

use parley_config::ParleyConfig;
use parley_core::{ParleyError, PluginAdapter, StorageAdapter};
use parley_gateway::{Gateway, GatewayState};
use parley_storage::SqliteStorage;
use tracing::{error, info};

use crate::shutdown;

/// Runs the `parley serve` command.
pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    init_tracing(&config.service.log_level);

    info!(name = %config.service.name, "starting parley serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage initialized");

    let state = GatewayState::new(storage.clone(), &config)?;
    let cancel = shutdown::install_signal_handler();
    let gateway = Gateway::new(config.gateway.clone(), state).with_cancellation(cancel);

    gateway.start().await?;
    let served = gateway.wait().await;
    if let Err(e) = &served {
        error!(error = %e, "gateway stopped with an error");
    }

    log_memory_stats();

    if let Err(e) = storage.shutdown().await {
        error!(error = %e, "storage shutdown failed");
        served?;
        return Err(e);
    }

    info!("parley stopped");
    served
}

#[cfg(not(target_env = "msvc"))]
fn log_memory_stats() {
    let _ = tikv_jemalloc_ctl::epoch::advance();
    let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
    let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
    tracing::debug!(allocated, resident, "jemalloc stats at shutdown");
}

#[cfg(target_env = "msvc")]
fn log_memory_stats() {}

/// Initializes the tracing subscriber. `RUST_LOG` overrides `log_level`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

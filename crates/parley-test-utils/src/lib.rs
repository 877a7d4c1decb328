// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! - [`FlakyStorage`] - storage wrapper with injectable transient failures
//! - [`temp_storage`] - an initialized SQLite store in a throwaway directory

pub mod mock_storage;

use std::sync::Arc;

use parley_config::model::StorageConfig;
use parley_core::{NewMessage, Role, StorageAdapter};
use parley_storage::SqliteStorage;
use tempfile::TempDir;

pub use mock_storage::{FlakyStorage, StorageOp};

/// Storage config pointing at `parley.db` inside `dir`.
pub fn storage_config(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        database_path: dir.path().join("parley.db").to_string_lossy().into_owned(),
        wal_mode: true,
        busy_timeout_ms: 1000,
    }
}

/// An initialized SQLite store. Keep the `TempDir` alive for the test's duration.
///
/// # Panics
///
/// Panics if the temp directory or database cannot be created.
pub async fn temp_storage() -> (Arc<SqliteStorage>, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let storage = SqliteStorage::new(storage_config(&dir));
    storage.initialize().await.expect("initialize temp storage");
    (Arc::new(storage), dir)
}

pub fn user_says(sender: &str, content: &str) -> NewMessage {
    NewMessage {
        sender_type: Role::User,
        sender_id: sender.into(),
        content: content.into(),
        metadata: None,
    }
}

pub fn agent_says(agent: &str, content: &str) -> NewMessage {
    NewMessage {
        sender_type: Role::Agent,
        sender_id: agent.into(),
        content: content.into(),
        metadata: None,
    }
}

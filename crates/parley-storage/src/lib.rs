// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Parley.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for
//! conversations, the ordered message log, conversation memory, and
//! attachment metadata.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;
pub mod stream;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use stream::{message_stream, message_stream_after};

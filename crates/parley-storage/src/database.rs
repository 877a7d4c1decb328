// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use parley_config::model::StorageConfig;
use parley_core::ParleyError;
use rusqlite::ErrorCode;
use tracing::{debug, info};

/// Handle to the single SQLite connection shared by every store.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

/// Error raised inside a connection closure.
///
/// Lets a transaction abort with a domain error (missing row, version
/// mismatch) while plain SQLite errors still flow through `?`.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Domain(ParleyError),
}

impl From<ParleyError> for TxError {
    fn from(err: ParleyError) -> Self {
        TxError::Domain(err)
    }
}

impl Database {
    /// Open (or create) the database, apply PRAGMAs and run pending migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, ParleyError> {
        let path = config.database_path.clone();
        if let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ParleyError::StorageUnavailable {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(map_sqlite_err)?;

        let wal_mode = config.wal_mode;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            if wal_mode {
                let mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    "WAL",
                    |row| row.get(0),
                )?;
                debug!(journal_mode = %mode, "journal mode set");
            }
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA synchronous = NORMAL;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), TxError> {
            crate::migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(map_tx_err)?;

        info!(path = %path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying single-writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), ParleyError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), ParleyError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(map_tr_err)?;
        debug!("database closed");
        Ok(())
    }
}

/// Classify a SQLite error as transient (`StorageUnavailable`) or not (`Storage`).
pub fn map_sqlite_err(err: rusqlite::Error) -> ParleyError {
    let transient = matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
                | ErrorCode::OutOfMemory
        )
    );
    if transient {
        ParleyError::StorageUnavailable {
            source: Box::new(err),
        }
    } else {
        ParleyError::Storage {
            source: Box::new(err),
        }
    }
}

/// Map a tokio-rusqlite error carrying a plain SQLite error.
pub fn map_tr_err(err: tokio_rusqlite::Error) -> ParleyError {
    match err {
        tokio_rusqlite::Error::Error(e) => map_sqlite_err(e),
        tokio_rusqlite::Error::ConnectionClosed => ParleyError::StorageUnavailable {
            source: "database connection closed".into(),
        },
        other => ParleyError::StorageUnavailable {
            source: other.to_string().into(),
        },
    }
}

/// Map a tokio-rusqlite error carrying a [`TxError`].
pub fn map_tx_err(err: tokio_rusqlite::Error<TxError>) -> ParleyError {
    match err {
        tokio_rusqlite::Error::Error(TxError::Sqlite(e)) => map_sqlite_err(e),
        tokio_rusqlite::Error::Error(TxError::Domain(e)) => e,
        tokio_rusqlite::Error::ConnectionClosed => ParleyError::StorageUnavailable {
            source: "database connection closed".into(),
        },
        other => ParleyError::StorageUnavailable {
            source: other.to_string().into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::config_for;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema_and_enables_wal() {
        let dir = tempdir().unwrap();
        let db = Database::open(&config_for(&dir.path().join("open.db")))
            .await
            .unwrap();

        let (mode, tables) = db
            .connection()
            .call(|conn| -> Result<(String, Vec<String>), rusqlite::Error> {
                let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let tables = stmt
                    .query_map([], |r| r.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok((mode, tables))
            })
            .await
            .unwrap();

        assert_eq!(mode.to_lowercase(), "wal");
        for table in [
            "attachments",
            "conversations",
            "memory_entries",
            "messages",
            "participants",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("parley.db");
        let db = Database::open(&config_for(&path)).await.unwrap();
        assert!(path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_does_not_rerun_migrations() {
        let dir = tempdir().unwrap();
        let config = config_for(&dir.path().join("reopen.db"));
        Database::open(&config).await.unwrap().close().await.unwrap();
        let db = Database::open(&config).await.unwrap();
        db.close().await.unwrap();
    }

    #[test]
    fn busy_errors_are_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(map_sqlite_err(busy).is_transient());

        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed".into()),
        );
        let mapped = map_sqlite_err(constraint);
        assert!(!mapped.is_transient());
        assert!(matches!(mapped, ParleyError::Storage { .. }));
    }

    #[test]
    fn closed_connection_is_transient() {
        assert!(map_tr_err(tokio_rusqlite::Error::ConnectionClosed).is_transient());
    }

    #[test]
    fn domain_errors_pass_through_unchanged() {
        let err = map_tx_err(tokio_rusqlite::Error::Error(TxError::Domain(
            ParleyError::not_found("conversation", "c1"),
        )));
        assert!(matches!(err, ParleyError::NotFound { entity: "conversation", .. }));
    }
}

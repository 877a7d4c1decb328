// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley conversation store.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The primary error type used across storage, adapters, and the gateway.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced conversation, message, or memory key does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Strict creation was requested and the record already exists.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// Caller supplied malformed or inconsistent input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The agent is not allowed to touch this memory key.
    #[error("agent {agent} may not access memory key `{key}`")]
    AccessDenied { agent: String, key: String },

    /// Optimistic version check failed on a memory write.
    #[error("version conflict on memory key `{key}`: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: i64,
        actual: i64,
    },

    /// The database is unreachable, busy, or otherwise transiently failing.
    #[error("storage unavailable: {source}")]
    StorageUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Non-transient storage errors (constraint violation, bad SQL, corrupt row).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Some writes of a turn were saved and some were not.
    #[error("{0}")]
    PartialPersistFailure(Box<PartialPersist>),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Shorthand for a [`ParleyError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether a retry of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. } | Self::Timeout { .. })
    }

    /// Whether the error originated in the storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::Storage { .. } | Self::Timeout { .. }
        )
    }
}

/// The kind of sub-write that failed during a persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Message,
    Attachment,
    Memory,
}

/// One failed sub-write of a persist call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWrite {
    pub kind: WriteKind,
    /// Message position in the turn, attachment owner, or memory key.
    pub target: String,
    pub reason: String,
}

/// Detail carried by [`ParleyError::PartialPersistFailure`].
///
/// Enough to reconcile by hand: which conversation, what landed, what did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialPersist {
    pub conversation_id: String,
    pub saved_message_ids: Vec<String>,
    pub saved_memory_keys: Vec<String>,
    pub failures: Vec<FailedWrite>,
}

impl fmt::Display for PartialPersist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partial persist failure in conversation {}: {} write(s) failed",
            self.conversation_id,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(
                f,
                "; {:?} `{}`: {}",
                failure.kind, failure.target, failure.reason
            )?;
        }
        Ok(())
    }
}

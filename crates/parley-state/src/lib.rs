// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent state adapters for Parley.
//!
//! Agents call [`StateRestorer`] at the start of a turn to load recent
//! history and the memory they may read, and [`StatePersister`] at the end
//! to save what the turn produced. Both sit on top of any
//! [`StorageAdapter`](parley_core::StorageAdapter), retry transient storage
//! errors with bounded backoff, and enforce the static memory policy.

pub mod persist;
pub mod policy;
pub mod restore;
pub mod retry;
pub mod state;

pub use persist::{MemoryUpdate, PersistOutcome, StatePersister, TurnMessage, TurnUpdate};
pub use policy::MemoryPolicy;
pub use restore::{RestoreOutcome, StateRestorer};
pub use retry::RetryPolicy;
pub use state::AgentState;

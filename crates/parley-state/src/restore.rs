// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rebuilds an agent's working state from the stores at the start of a turn.

use std::sync::Arc;

use parley_config::ParleyConfig;
use parley_core::{AgentType, IdentityKey, ParleyError, StorageAdapter};
use serde::Serialize;
use tracing::{debug, warn};

use crate::policy::MemoryPolicy;
use crate::retry::RetryPolicy;
use crate::state::AgentState;

/// Result of [`StateRestorer::restore_or_default`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreOutcome {
    pub state: AgentState,
    /// The stores could not be read and `state` is the empty fallback.
    pub degraded: bool,
}

/// Restores [`AgentState`] for an agent and identity. Never creates anything.
#[derive(Clone)]
pub struct StateRestorer {
    storage: Arc<dyn StorageAdapter>,
    policy: Arc<MemoryPolicy>,
    retry: RetryPolicy,
    recent_messages: usize,
}

impl StateRestorer {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        policy: Arc<MemoryPolicy>,
        retry: RetryPolicy,
        recent_messages: usize,
    ) -> Self {
        Self {
            storage,
            policy,
            retry,
            recent_messages,
        }
    }

    pub fn from_config(
        storage: Arc<dyn StorageAdapter>,
        policy: Arc<MemoryPolicy>,
        config: &ParleyConfig,
    ) -> Self {
        Self::new(
            storage,
            policy,
            RetryPolicy::from_config(&config.persist),
            config.restore.recent_messages,
        )
    }

    /// Load recent history and readable memory for `agent` talking to `identity`.
    ///
    /// An identity without a conversation restores to [`AgentState::empty`].
    pub async fn restore(
        &self,
        agent: AgentType,
        identity: &IdentityKey,
    ) -> Result<AgentState, ParleyError> {
        let storage = self.storage.as_ref();
        let entity_type = identity.entity_type();
        let (entity_type, entity_id) = (entity_type.as_str(), identity.id.as_str());

        let conversation = self
            .retry
            .run("find_conversation", move || {
                storage.find_conversation(entity_type, Some(entity_id), Some(agent))
            })
            .await?;

        let Some(conversation) = conversation else {
            debug!(%agent, identity = %identity.id, "no conversation yet, empty state");
            return Ok(AgentState::empty(agent, identity.clone()));
        };

        let conversation_id = conversation.id.as_str();
        let count = i64::try_from(self.recent_messages).unwrap_or(i64::MAX);
        let messages = self
            .retry
            .run("recent_messages", move || {
                storage.recent_messages(conversation_id, count)
            })
            .await?;
        let entries = self
            .retry
            .run("list_memory", move || storage.list_memory(conversation_id))
            .await?;

        let mut state = AgentState::empty(agent, identity.clone());
        state.conversation_id = Some(conversation.id.clone());
        state.messages = messages;
        for entry in entries {
            if self.policy.allows(agent, &entry.key) {
                state.insert_memory(entry);
            }
        }

        debug!(
            %agent,
            conversation_id = %conversation.id,
            messages = state.messages.len(),
            memory_keys = state.memory.len(),
            "state restored"
        );
        Ok(state)
    }

    /// Like [`restore`](Self::restore), but a storage failure yields the
    /// empty state flagged as degraded instead of an error.
    ///
    /// Input errors are still returned.
    pub async fn restore_or_default(
        &self,
        agent: AgentType,
        identity: &IdentityKey,
    ) -> Result<RestoreOutcome, ParleyError> {
        match self.restore(agent, identity).await {
            Ok(state) => Ok(RestoreOutcome {
                state,
                degraded: false,
            }),
            Err(err) if err.is_storage() => {
                warn!(
                    %agent,
                    identity = %identity.id,
                    error = %err,
                    "state restore failed, continuing with empty state"
                );
                Ok(RestoreOutcome {
                    state: AgentState::empty(agent, identity.clone()),
                    degraded: true,
                })
            }
            Err(err) => Err(err),
        }
    }
}

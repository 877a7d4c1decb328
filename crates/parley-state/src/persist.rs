// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Writes the messages, attachments, and memory produced by one agent turn.

use std::collections::BTreeMap;
use std::sync::Arc;

use parley_config::ParleyConfig;
use parley_core::{
    AgentType, CreatePolicy, FailedWrite, IdentityKey, MemoryWrite, MergeStrategy, NewAttachment,
    NewConversation, NewMessage, ParleyError, PartialPersist, Role, StorageAdapter, WriteKind,
    memory,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::policy::MemoryPolicy;
use crate::retry::RetryPolicy;

/// Everything an agent wants saved at the end of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnUpdate {
    #[serde(default)]
    pub messages: Vec<TurnMessage>,
    #[serde(default)]
    pub memory_updates: Vec<MemoryUpdate>,
}

/// A message together with the attachments uploaded with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMessage {
    #[serde(flatten)]
    pub message: NewMessage,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

impl From<NewMessage> for TurnMessage {
    fn from(message: NewMessage) -> Self {
        Self {
            message,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub key: String,
    pub value: Value,
    /// Overrides the configured strategy for this key.
    #[serde(default)]
    pub merge_strategy: Option<MergeStrategy>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl MemoryUpdate {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            merge_strategy: None,
            expected_version: None,
        }
    }
}

/// What a fully successful persist wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistOutcome {
    pub conversation_id: String,
    /// The conversation was created by this call.
    pub created: bool,
    /// In the order the messages were given.
    pub message_ids: Vec<String>,
    pub attachment_ids: Vec<String>,
    /// New version of every written key.
    pub memory_versions: BTreeMap<String, i64>,
}

/// Persists [`TurnUpdate`]s, reporting exactly what landed when only part of one did.
#[derive(Clone)]
pub struct StatePersister {
    storage: Arc<dyn StorageAdapter>,
    policy: Arc<MemoryPolicy>,
    retry: RetryPolicy,
}

impl StatePersister {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        policy: Arc<MemoryPolicy>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            policy,
            retry,
        }
    }

    pub fn from_config(
        storage: Arc<dyn StorageAdapter>,
        policy: Arc<MemoryPolicy>,
        config: &ParleyConfig,
    ) -> Self {
        Self::new(storage, policy, RetryPolicy::from_config(&config.persist))
    }

    /// Persist one turn of `agent` talking to `identity`.
    ///
    /// Input is validated before anything is written. Messages are appended
    /// in order and appending stops at the first message that cannot be
    /// saved. If some writes landed and some did not, the result is
    /// [`ParleyError::PartialPersistFailure`]; if none did, the first error.
    pub async fn persist(
        &self,
        agent: AgentType,
        identity: &IdentityKey,
        update: &TurnUpdate,
    ) -> Result<PersistOutcome, ParleyError> {
        self.validate(agent, identity, update)?;

        let storage = self.storage.as_ref();
        let agent_name = agent.to_string();

        let new = NewConversation {
            entity_type: identity.entity_type(),
            entity_id: Some(identity.id.clone()),
            agent_type: Some(agent),
            participant_id: identity.id.clone(),
            participant_role: Role::User,
        };
        let new = &new;
        let (conversation, created) = self
            .retry
            .run("create_conversation", move || {
                storage.create_conversation(new, CreatePolicy::FindOrCreate)
            })
            .await?;
        let conversation_id = conversation.id.as_str();
        let agent_id = agent_name.as_str();
        self.retry
            .run("add_participant", move || {
                storage.add_participant(conversation_id, agent_id, Role::Agent)
            })
            .await?;

        let mut outcome = PersistOutcome {
            conversation_id: conversation.id.clone(),
            created,
            message_ids: Vec::new(),
            attachment_ids: Vec::new(),
            memory_versions: BTreeMap::new(),
        };
        let mut failures = Vec::new();
        let mut first_error = None;

        for (index, turn_message) in update.messages.iter().enumerate() {
            let message = &turn_message.message;
            let saved = self
                .retry
                .run("append_message", move || {
                    storage.append_message(conversation_id, message)
                })
                .await;
            let saved = match saved {
                Ok(saved) => saved,
                Err(err) => {
                    // Later messages would land out of order; record them as skipped.
                    for skipped in index..update.messages.len() {
                        let reason = if skipped == index {
                            err.to_string()
                        } else {
                            "not attempted: an earlier message failed".to_string()
                        };
                        failures.push(FailedWrite {
                            kind: WriteKind::Message,
                            target: format!("messages[{skipped}]"),
                            reason,
                        });
                    }
                    first_error.get_or_insert(err);
                    break;
                }
            };

            let message_id = saved.id.as_str();
            for attachment in &turn_message.attachments {
                let result = self
                    .retry
                    .run("add_attachment", move || {
                        storage.add_attachment(message_id, attachment)
                    })
                    .await;
                match result {
                    Ok(attachment) => outcome.attachment_ids.push(attachment.id),
                    Err(err) => {
                        failures.push(FailedWrite {
                            kind: WriteKind::Attachment,
                            target: format!("{message_id}:{}", attachment.storage_ref),
                            reason: err.to_string(),
                        });
                        first_error.get_or_insert(err);
                    }
                }
            }
            outcome.message_ids.push(saved.id);
        }

        for update in &update.memory_updates {
            let strategy = update
                .merge_strategy
                .unwrap_or_else(|| self.policy.strategy_for(&update.key));
            let mut write = MemoryWrite::new(update.key.clone(), update.value.clone(), strategy)
                .written_by(agent_name.clone());
            write.expected_version = update.expected_version;
            let write = &write;

            let result = self
                .retry
                .run("put_memory", move || storage.put_memory(conversation_id, write))
                .await;
            match result {
                Ok(entry) => {
                    outcome.memory_versions.insert(entry.key, entry.version);
                }
                Err(err) => {
                    failures.push(FailedWrite {
                        kind: WriteKind::Memory,
                        target: update.key.clone(),
                        reason: err.to_string(),
                    });
                    first_error.get_or_insert(err);
                }
            }
        }

        let Some(first_error) = first_error else {
            debug!(
                %agent,
                conversation_id = %outcome.conversation_id,
                created = outcome.created,
                messages = outcome.message_ids.len(),
                attachments = outcome.attachment_ids.len(),
                memory_keys = outcome.memory_versions.len(),
                "turn persisted"
            );
            return Ok(outcome);
        };

        let wrote_nothing = outcome.message_ids.is_empty()
            && outcome.attachment_ids.is_empty()
            && outcome.memory_versions.is_empty();
        if wrote_nothing {
            return Err(first_error);
        }

        let partial = PartialPersist {
            conversation_id: outcome.conversation_id,
            saved_message_ids: outcome.message_ids,
            saved_memory_keys: outcome.memory_versions.into_keys().collect(),
            failures,
        };
        error!(
            %agent,
            conversation_id = %partial.conversation_id,
            saved_messages = partial.saved_message_ids.len(),
            saved_memory_keys = ?partial.saved_memory_keys,
            failures = ?partial.failures,
            "turn only partially persisted"
        );
        Err(ParleyError::PartialPersistFailure(Box::new(partial)))
    }

    fn validate(
        &self,
        agent: AgentType,
        identity: &IdentityKey,
        update: &TurnUpdate,
    ) -> Result<(), ParleyError> {
        if identity.id.trim().is_empty() {
            return Err(ParleyError::InvalidInput(
                "identity id must not be empty".into(),
            ));
        }
        for turn_message in &update.messages {
            turn_message.message.validate()?;
            for attachment in &turn_message.attachments {
                attachment.validate()?;
            }
        }
        for update in &update.memory_updates {
            if update.key.trim().is_empty() {
                return Err(ParleyError::InvalidInput(
                    "memory key must not be empty".into(),
                ));
            }
            self.policy.check_access(agent, &update.key)?;
            memory::validate(&update.key, &update.value)?;
            if let Some(expected) = update.expected_version
                && expected < 0
            {
                return Err(ParleyError::InvalidInput(format!(
                    "expected_version for `{}` must not be negative",
                    update.key
                )));
            }
        }
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the stores, the state adapters, and the gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::ParleyError;
use crate::merge::MergeStrategy;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Gateway,
}

/// The conversational agents that restore and persist state through Parley.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentType {
    /// Customer interface agent.
    Cia,
    /// Job assessment agent.
    Jaa,
    /// Contractor discovery agent.
    Cda,
    /// External outreach agent.
    Eaa,
    /// Website form automation agent.
    Wfa,
    /// Design inspiration agent.
    Iris,
    /// Contractor onboarding agent.
    Coia,
    /// Bid submission agent.
    Bsa,
}

impl AgentType {
    pub const ALL: [AgentType; 8] = [
        AgentType::Cia,
        AgentType::Jaa,
        AgentType::Cda,
        AgentType::Eaa,
        AgentType::Wfa,
        AgentType::Iris,
        AgentType::Coia,
        AgentType::Bsa,
    ];
}

/// Role of a participant, and sender type of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Agent,
    System,
}

/// What kind of external identity an [`IdentityKey`] names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    User,
    Contractor,
    /// Anonymous browser session.
    Session,
}

/// The external key an agent uses to find its conversation.
///
/// Always passed explicitly; nothing in Parley reads identity from ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub kind: IdentityKind,
    pub id: String,
}

impl IdentityKey {
    pub fn new(kind: IdentityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(IdentityKind::User, id)
    }

    pub fn contractor(id: impl Into<String>) -> Self {
        Self::new(IdentityKind::Contractor, id)
    }

    pub fn session(id: impl Into<String>) -> Self {
        Self::new(IdentityKind::Session, id)
    }

    /// The conversation `entity_type` this identity resolves to.
    pub fn entity_type(&self) -> String {
        self.kind.to_string()
    }
}

/// Policy for [`create_conversation`](crate::StorageAdapter::create_conversation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatePolicy {
    /// Always insert a new conversation.
    CreateNew,
    /// Return the existing conversation for the entity if there is one.
    #[default]
    FindOrCreate,
    /// Fail with `AlreadyExists` if the entity already has a conversation.
    Strict,
}

/// Incremental fetch cursor for message listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageCursor {
    /// Messages with `seq` strictly greater than this.
    AfterSeq(i64),
    /// Messages appended after the message with this id.
    AfterMessage(String),
}

/// A logical thread of messages tied to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub agent_type: Option<AgentType>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: String,
    pub identity_id: String,
    pub role: Role,
    pub joined_at: String,
}

/// An entry of the append-only message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    /// Per-conversation ordinal assigned by the store, starting at 1.
    pub seq: i64,
    pub sender_type: Role,
    pub sender_id: String,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
}

/// File metadata attached to a message. The bytes live in blob storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub message_id: String,
    pub kind: AttachmentKind,
    pub storage_ref: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub metadata: Option<Value>,
    pub created_at: String,
}

/// A JSON-valued fact scoped to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub conversation_id: String,
    pub key: String,
    pub value: Value,
    /// Starts at 1 and increases by one on every write.
    pub version: i64,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub agent_type: Option<AgentType>,
    pub participant_id: String,
    pub participant_role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_type: Role,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub storage_ref: String,
    pub mime_type: String,
    #[serde(rename = "size")]
    pub size_bytes: i64,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewMessage {
    /// Reject messages no store would accept.
    pub fn validate(&self) -> Result<(), ParleyError> {
        if self.sender_id.trim().is_empty() {
            return Err(ParleyError::InvalidInput(
                "sender_id must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl NewAttachment {
    /// Reject attachment metadata that can never be stored.
    pub fn validate(&self) -> Result<(), ParleyError> {
        if self.size_bytes < 0 {
            return Err(ParleyError::InvalidInput(format!(
                "attachment size must not be negative, got {}",
                self.size_bytes
            )));
        }
        if self.storage_ref.trim().is_empty() {
            return Err(ParleyError::InvalidInput(
                "attachment storage_ref must not be empty".into(),
            ));
        }
        if self.mime_type.trim().is_empty() {
            return Err(ParleyError::InvalidInput(
                "attachment mime_type must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// A single memory upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryWrite {
    pub key: String,
    pub value: Value,
    pub strategy: MergeStrategy,
    /// `Some(0)`: the key must not exist yet. `Some(n)`: current version must be `n`.
    pub expected_version: Option<i64>,
    pub written_by: Option<String>,
}

impl MemoryWrite {
    pub fn new(key: impl Into<String>, value: Value, strategy: MergeStrategy) -> Self {
        Self {
            key: key.into(),
            value,
            strategy,
            expected_version: None,
            written_by: None,
        }
    }

    pub fn expect_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn written_by(mut self, writer: impl Into<String>) -> Self {
        self.written_by = Some(writer.into());
        self
    }
}

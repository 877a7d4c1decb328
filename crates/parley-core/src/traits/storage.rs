// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait covering the conversation, memory, and attachment stores.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AgentType, Attachment, Conversation, CreatePolicy, MemoryEntry, MemoryWrite, Message,
    MessageCursor, NewAttachment, NewConversation, NewMessage, Participant, Role,
};

/// Adapter for persistence backends.
///
/// Implementations must assign message ordinals themselves and serialize
/// concurrent appends to the same conversation; callers never supply order.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParleyError>;

    // --- Conversation store ---

    /// Create a conversation with its first participant.
    ///
    /// Returns the conversation and whether it was newly inserted.
    async fn create_conversation(
        &self,
        new: &NewConversation,
        policy: CreatePolicy,
    ) -> Result<(Conversation, bool), ParleyError>;

    /// Most recently active conversation for an entity. `agent_type = None`
    /// matches conversations of any agent.
    async fn find_conversation(
        &self,
        entity_type: &str,
        entity_id: Option<&str>,
        agent_type: Option<AgentType>,
    ) -> Result<Option<Conversation>, ParleyError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ParleyError>;

    async fn list_conversations_for_participant(
        &self,
        identity_id: &str,
    ) -> Result<Vec<Conversation>, ParleyError>;

    /// Add an identity to a conversation. Joining twice is a no-op.
    async fn add_participant(
        &self,
        conversation_id: &str,
        identity_id: &str,
        role: Role,
    ) -> Result<(), ParleyError>;

    async fn list_participants(&self, conversation_id: &str)
    -> Result<Vec<Participant>, ParleyError>;

    /// Append to the message log. Fails with `NotFound` for unknown conversations.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: &NewMessage,
    ) -> Result<Message, ParleyError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ParleyError>;

    /// Messages in ascending `seq` order, optionally after a cursor.
    async fn list_messages(
        &self,
        conversation_id: &str,
        since: Option<&MessageCursor>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError>;

    /// The last `count` messages of a conversation, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        count: i64,
    ) -> Result<Vec<Message>, ParleyError>;

    // --- Memory store ---

    async fn get_memory(
        &self,
        conversation_id: &str,
        key: &str,
    ) -> Result<Option<MemoryEntry>, ParleyError>;

    /// Upsert a memory key, applying the write's merge strategy atomically.
    async fn put_memory(
        &self,
        conversation_id: &str,
        write: &MemoryWrite,
    ) -> Result<MemoryEntry, ParleyError>;

    /// Snapshot of every memory entry of a conversation, ordered by key.
    async fn list_memory(&self, conversation_id: &str) -> Result<Vec<MemoryEntry>, ParleyError>;

    // --- Attachment store ---

    /// Attach a file to an existing message. Fails with `NotFound` otherwise.
    async fn add_attachment(
        &self,
        message_id: &str,
        attachment: &NewAttachment,
    ) -> Result<Attachment, ParleyError>;

    async fn list_attachments(&self, message_id: &str) -> Result<Vec<Attachment>, ParleyError>;

    /// `(message_id, attachment)` pairs in message order, then upload order.
    async fn list_attachments_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<(String, Attachment)>, ParleyError>;
}

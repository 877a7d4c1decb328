// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage wrapper with injectable failures.
//!
//! `FlakyStorage` delegates every call to a real [`StorageAdapter`] unless a
//! failure has been armed for that operation, in which case it returns
//! `StorageUnavailable` without touching the inner store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::{
    AdapterType, AgentType, Attachment, Conversation, CreatePolicy, HealthStatus, MemoryEntry,
    MemoryWrite, Message, MessageCursor, NewAttachment, NewConversation, NewMessage, ParleyError,
    Participant, PluginAdapter, Role, StorageAdapter,
};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    CreateConversation,
    FindConversation,
    AppendMessage,
    RecentMessages,
    AddAttachment,
    PutMemory,
    ListMemory,
}

#[derive(Debug, Clone, Copy)]
enum Armed {
    Times(u32),
    Always,
}

/// A storage adapter that fails on demand.
pub struct FlakyStorage {
    inner: Arc<dyn StorageAdapter>,
    armed: Mutex<HashMap<StorageOp, Armed>>,
    calls: Mutex<HashMap<StorageOp, u32>>,
}

impl FlakyStorage {
    pub fn new(inner: Arc<dyn StorageAdapter>) -> Self {
        Self {
            inner,
            armed: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next `times` calls of `op`.
    pub async fn fail_times(&self, op: StorageOp, times: u32) {
        self.armed.lock().await.insert(op, Armed::Times(times));
    }

    /// Fail every call of `op` until [`heal`](Self::heal).
    pub async fn fail_always(&self, op: StorageOp) {
        self.armed.lock().await.insert(op, Armed::Always);
    }

    pub async fn heal(&self) {
        self.armed.lock().await.clear();
    }

    /// How many times `op` was called, failed calls included.
    pub async fn calls(&self, op: StorageOp) -> u32 {
        self.calls.lock().await.get(&op).copied().unwrap_or(0)
    }

    async fn check(&self, op: StorageOp) -> Result<(), ParleyError> {
        *self.calls.lock().await.entry(op).or_default() += 1;

        let mut armed = self.armed.lock().await;
        let fail = match armed.get_mut(&op) {
            Some(Armed::Always) => true,
            Some(Armed::Times(0)) | None => false,
            Some(Armed::Times(n)) => {
                *n -= 1;
                true
            }
        };
        if fail {
            return Err(ParleyError::StorageUnavailable {
                source: format!("injected {op:?} failure").into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for FlakyStorage {
    fn name(&self) -> &str {
        "flaky"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl StorageAdapter for FlakyStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.inner.close().await
    }

    async fn create_conversation(
        &self,
        new: &NewConversation,
        policy: CreatePolicy,
    ) -> Result<(Conversation, bool), ParleyError> {
        self.check(StorageOp::CreateConversation).await?;
        self.inner.create_conversation(new, policy).await
    }

    async fn find_conversation(
        &self,
        entity_type: &str,
        entity_id: Option<&str>,
        agent_type: Option<AgentType>,
    ) -> Result<Option<Conversation>, ParleyError> {
        self.check(StorageOp::FindConversation).await?;
        self.inner
            .find_conversation(entity_type, entity_id, agent_type)
            .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ParleyError> {
        self.inner.get_conversation(id).await
    }

    async fn list_conversations_for_participant(
        &self,
        identity_id: &str,
    ) -> Result<Vec<Conversation>, ParleyError> {
        self.inner.list_conversations_for_participant(identity_id).await
    }

    async fn add_participant(
        &self,
        conversation_id: &str,
        identity_id: &str,
        role: Role,
    ) -> Result<(), ParleyError> {
        self.inner
            .add_participant(conversation_id, identity_id, role)
            .await
    }

    async fn list_participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Participant>, ParleyError> {
        self.inner.list_participants(conversation_id).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &NewMessage,
    ) -> Result<Message, ParleyError> {
        self.check(StorageOp::AppendMessage).await?;
        self.inner.append_message(conversation_id, message).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ParleyError> {
        self.inner.get_message(id).await
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        since: Option<&MessageCursor>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError> {
        self.inner.list_messages(conversation_id, since, limit).await
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        count: i64,
    ) -> Result<Vec<Message>, ParleyError> {
        self.check(StorageOp::RecentMessages).await?;
        self.inner.recent_messages(conversation_id, count).await
    }

    async fn get_memory(
        &self,
        conversation_id: &str,
        key: &str,
    ) -> Result<Option<MemoryEntry>, ParleyError> {
        self.inner.get_memory(conversation_id, key).await
    }

    async fn put_memory(
        &self,
        conversation_id: &str,
        write: &MemoryWrite,
    ) -> Result<MemoryEntry, ParleyError> {
        self.check(StorageOp::PutMemory).await?;
        self.inner.put_memory(conversation_id, write).await
    }

    async fn list_memory(&self, conversation_id: &str) -> Result<Vec<MemoryEntry>, ParleyError> {
        self.check(StorageOp::ListMemory).await?;
        self.inner.list_memory(conversation_id).await
    }

    async fn add_attachment(
        &self,
        message_id: &str,
        attachment: &NewAttachment,
    ) -> Result<Attachment, ParleyError> {
        self.check(StorageOp::AddAttachment).await?;
        self.inner.add_attachment(message_id, attachment).await
    }

    async fn list_attachments(&self, message_id: &str) -> Result<Vec<Attachment>, ParleyError> {
        self.inner.list_attachments(message_id).await
    }

    async fn list_attachments_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<(String, Attachment)>, ParleyError> {
        self.inner
            .list_attachments_for_conversation(conversation_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temp_storage;

    #[tokio::test]
    async fn armed_failures_run_out() {
        let (inner, _dir) = temp_storage().await;
        let flaky = FlakyStorage::new(inner);
        flaky.fail_times(StorageOp::FindConversation, 2).await;

        for _ in 0..2 {
            let err = flaky
                .find_conversation("user", Some("u1"), None)
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        assert!(
            flaky
                .find_conversation("user", Some("u1"), None)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(flaky.calls(StorageOp::FindConversation).await, 3);
    }

    #[tokio::test]
    async fn always_fails_until_healed() {
        let (inner, _dir) = temp_storage().await;
        let (conversation, _) = inner
            .create_conversation(
                &NewConversation {
                    entity_type: "user".into(),
                    entity_id: Some("u1".into()),
                    agent_type: None,
                    participant_id: "u1".into(),
                    participant_role: Role::User,
                },
                CreatePolicy::FindOrCreate,
            )
            .await
            .unwrap();
        let flaky = FlakyStorage::new(inner);
        flaky.fail_always(StorageOp::ListMemory).await;
        assert!(flaky.list_memory(&conversation.id).await.is_err());
        assert!(flaky.list_memory(&conversation.id).await.is_err());
        assert_eq!(flaky.calls(StorageOp::ListMemory).await, 2);

        flaky.heal().await;
        assert!(flaky.list_memory(&conversation.id).await.unwrap().is_empty());
    }
}

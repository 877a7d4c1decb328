// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::{
    AdapterType, AgentType, Attachment, Conversation, CreatePolicy, HealthStatus, MemoryEntry,
    MemoryWrite, Message, MessageCursor, NewAttachment, NewConversation, NewMessage, ParleyError,
    Participant, PluginAdapter, Role, StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageAdapter::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, ParleyError> {
        self.db.get().ok_or_else(|| ParleyError::StorageUnavailable {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let db = self.db()?;
        let probe = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await;
        Ok(match probe {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        // Shutdown delegates to close if the DB was initialized.
        if self.db.get().is_some() {
            self.close().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open(&self.config).await?;
        self.db.set(db).map_err(|_| ParleyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Conversation store ---

    async fn create_conversation(
        &self,
        new: &NewConversation,
        policy: CreatePolicy,
    ) -> Result<(Conversation, bool), ParleyError> {
        queries::conversations::create_conversation(self.db()?, new, policy).await
    }

    async fn find_conversation(
        &self,
        entity_type: &str,
        entity_id: Option<&str>,
        agent_type: Option<AgentType>,
    ) -> Result<Option<Conversation>, ParleyError> {
        queries::conversations::find_conversation(self.db()?, entity_type, entity_id, agent_type)
            .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ParleyError> {
        queries::conversations::get_conversation(self.db()?, id).await
    }

    async fn list_conversations_for_participant(
        &self,
        identity_id: &str,
    ) -> Result<Vec<Conversation>, ParleyError> {
        queries::conversations::list_conversations_for_participant(self.db()?, identity_id).await
    }

    async fn add_participant(
        &self,
        conversation_id: &str,
        identity_id: &str,
        role: Role,
    ) -> Result<(), ParleyError> {
        queries::conversations::add_participant(self.db()?, conversation_id, identity_id, role)
            .await
    }

    async fn list_participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Participant>, ParleyError> {
        queries::conversations::list_participants(self.db()?, conversation_id).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &NewMessage,
    ) -> Result<Message, ParleyError> {
        queries::messages::append_message(self.db()?, conversation_id, message).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ParleyError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        since: Option<&MessageCursor>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ParleyError> {
        queries::messages::list_messages(self.db()?, conversation_id, since, limit).await
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        count: i64,
    ) -> Result<Vec<Message>, ParleyError> {
        queries::messages::recent_messages(self.db()?, conversation_id, count).await
    }

    // --- Memory store ---

    async fn get_memory(
        &self,
        conversation_id: &str,
        key: &str,
    ) -> Result<Option<MemoryEntry>, ParleyError> {
        queries::memory::get_memory(self.db()?, conversation_id, key).await
    }

    async fn put_memory(
        &self,
        conversation_id: &str,
        write: &MemoryWrite,
    ) -> Result<MemoryEntry, ParleyError> {
        queries::memory::put_memory(self.db()?, conversation_id, write).await
    }

    async fn list_memory(&self, conversation_id: &str) -> Result<Vec<MemoryEntry>, ParleyError> {
        queries::memory::list_memory(self.db()?, conversation_id).await
    }

    // --- Attachment store ---

    async fn add_attachment(
        &self,
        message_id: &str,
        attachment: &NewAttachment,
    ) -> Result<Attachment, ParleyError> {
        queries::attachments::add_attachment(self.db()?, message_id, attachment).await
    }

    async fn list_attachments(&self, message_id: &str) -> Result<Vec<Attachment>, ParleyError> {
        queries::attachments::list_attachments(self.db()?, message_id).await
    }

    async fn list_attachments_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<(String, Attachment)>, ParleyError> {
        queries::attachments::list_attachments_for_conversation(self.db()?, conversation_id).await
    }
}

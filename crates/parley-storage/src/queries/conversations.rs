// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation and participant operations.

use parley_core::{
    AgentType, Conversation, CreatePolicy, NewConversation, ParleyError, Participant, Role,
};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use crate::database::{map_tr_err, map_tx_err, Database, TxError};
use crate::queries::{enum_column, exists, optional_enum_column};

const CONVERSATION_COLUMNS: &str = "id, entity_type, entity_id, agent_type, created_at, updated_at";

pub(crate) fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        agent_type: optional_enum_column(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn select_conversation(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
        [id],
        conversation_from_row,
    )
    .optional()
}

/// Latest conversation for an entity. With `any_agent`, the agent column is ignored.
fn select_latest(
    conn: &rusqlite::Connection,
    entity_type: &str,
    entity_id: Option<&str>,
    agent_type: Option<&str>,
    any_agent: bool,
) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE entity_type = ?1 AND entity_id IS ?2 AND (?4 OR agent_type IS ?3)
             ORDER BY updated_at DESC, rowid DESC
             LIMIT 1"
        ),
        params![entity_type, entity_id, agent_type, any_agent],
        conversation_from_row,
    )
    .optional()
}

fn insert_participant(
    conn: &rusqlite::Connection,
    conversation_id: &str,
    identity_id: &str,
    role: Role,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO participants (conversation_id, identity_id, role)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (conversation_id, identity_id) DO NOTHING",
        params![conversation_id, identity_id, role.to_string()],
    )?;
    Ok(())
}

/// Create a conversation under `policy`. Lookup and insert share one transaction.
pub async fn create_conversation(
    db: &Database,
    new: &NewConversation,
    policy: CreatePolicy,
) -> Result<(Conversation, bool), ParleyError> {
    if new.entity_type.trim().is_empty() {
        return Err(ParleyError::InvalidInput(
            "entity_type must not be empty".into(),
        ));
    }
    if new.participant_id.trim().is_empty() {
        return Err(ParleyError::InvalidInput(
            "a conversation needs an initial participant".into(),
        ));
    }

    let new = new.clone();
    db.connection()
        .call(move |conn| -> Result<(Conversation, bool), TxError> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let agent = new.agent_type.map(|a| a.to_string());

            if policy != CreatePolicy::CreateNew
                && let Some(existing) = select_latest(
                    &tx,
                    &new.entity_type,
                    new.entity_id.as_deref(),
                    agent.as_deref(),
                    false,
                )?
            {
                if policy == CreatePolicy::Strict {
                    return Err(ParleyError::AlreadyExists {
                        entity: "conversation",
                        key: entity_key(&new),
                    }
                    .into());
                }
                insert_participant(&tx, &existing.id, &new.participant_id, new.participant_role)?;
                tx.commit()?;
                return Ok((existing, false));
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO conversations (id, entity_type, entity_id, agent_type)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, new.entity_type, new.entity_id, agent],
            )?;
            insert_participant(&tx, &id, &new.participant_id, new.participant_role)?;
            let conversation = select_conversation(&tx, &id)?
                .ok_or_else(|| ParleyError::Internal(format!("conversation {id} vanished")))?;
            tx.commit()?;
            Ok((conversation, true))
        })
        .await
        .map_err(map_tx_err)
}

fn entity_key(new: &NewConversation) -> String {
    let mut key = format!(
        "{}/{}",
        new.entity_type,
        new.entity_id.as_deref().unwrap_or("-")
    );
    if let Some(agent) = new.agent_type {
        key.push('/');
        key.push_str(&agent.to_string());
    }
    key
}

/// Most recently updated conversation for an entity.
pub async fn find_conversation(
    db: &Database,
    entity_type: &str,
    entity_id: Option<&str>,
    agent_type: Option<AgentType>,
) -> Result<Option<Conversation>, ParleyError> {
    let entity_type = entity_type.to_string();
    let entity_id = entity_id.map(str::to_string);
    let agent = agent_type.map(|a| a.to_string());
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            let any_agent = agent.is_none();
            select_latest(
                conn,
                &entity_type,
                entity_id.as_deref(),
                agent.as_deref(),
                any_agent,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Get a conversation by ID.
pub async fn get_conversation(db: &Database, id: &str) -> Result<Option<Conversation>, ParleyError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            select_conversation(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}

/// Conversations an identity takes part in, most recent activity first.
pub async fn list_conversations_for_participant(
    db: &Database,
    identity_id: &str,
) -> Result<Vec<Conversation>, ParleyError> {
    let identity_id = identity_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.entity_type, c.entity_id, c.agent_type, c.created_at, c.updated_at
                 FROM conversations c
                 JOIN participants p ON p.conversation_id = c.id
                 WHERE p.identity_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC",
            )?;
            let rows = stmt.query_map([&identity_id], conversation_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Add a participant. Joining twice keeps the original role and join time.
pub async fn add_participant(
    db: &Database,
    conversation_id: &str,
    identity_id: &str,
    role: Role,
) -> Result<(), ParleyError> {
    if identity_id.trim().is_empty() {
        return Err(ParleyError::InvalidInput(
            "participant id must not be empty".into(),
        ));
    }
    let conversation_id = conversation_id.to_string();
    let identity_id = identity_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            if !exists(conn, "conversations", &conversation_id)? {
                return Err(ParleyError::not_found("conversation", conversation_id).into());
            }
            insert_participant(conn, &conversation_id, &identity_id, role)?;
            Ok(())
        })
        .await
        .map_err(map_tx_err)
}

/// Participants in join order.
pub async fn list_participants(
    db: &Database,
    conversation_id: &str,
) -> Result<Vec<Participant>, ParleyError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Participant>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, identity_id, role, joined_at
                 FROM participants WHERE conversation_id = ?1
                 ORDER BY joined_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map([&conversation_id], |row| {
                Ok(Participant {
                    conversation_id: row.get(0)?,
                    identity_id: row.get(1)?,
                    role: enum_column(row, 2)?,
                    joined_at: row.get(3)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_conversation, open_db};

    #[tokio::test]
    async fn create_then_get_conversation() {
        let (db, _dir) = open_db().await;
        let new = new_conversation("property", Some("p1"), Some(AgentType::Cia), "u1");

        let (conv, created) = create_conversation(&db, &new, CreatePolicy::CreateNew)
            .await
            .unwrap();
        assert!(created);
        assert_eq!(conv.entity_type, "property");
        assert_eq!(conv.entity_id.as_deref(), Some("p1"));
        assert_eq!(conv.agent_type, Some(AgentType::Cia));
        assert!(conv.created_at.ends_with('Z'));

        let fetched = get_conversation(&db, &conv.id).await.unwrap().unwrap();
        assert_eq!(fetched, conv);

        let participants = list_participants(&db, &conv.id).await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].identity_id, "u1");
        assert_eq!(participants[0].role, Role::User);
    }

    #[tokio::test]
    async fn find_or_create_reuses_existing_conversation() {
        let (db, _dir) = open_db().await;
        let new = new_conversation("bid_card", Some("b1"), Some(AgentType::Bsa), "c1");

        let (first, created) = create_conversation(&db, &new, CreatePolicy::FindOrCreate)
            .await
            .unwrap();
        assert!(created);

        let second_new = new_conversation("bid_card", Some("b1"), Some(AgentType::Bsa), "c2");
        let (second, created) = create_conversation(&db, &second_new, CreatePolicy::FindOrCreate)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let participants = list_participants(&db, &first.id).await.unwrap();
        assert_eq!(participants.len(), 2);
    }

    #[tokio::test]
    async fn strict_create_rejects_duplicate_triple() {
        let (db, _dir) = open_db().await;
        let new = new_conversation("property", Some("p9"), None, "u1");
        create_conversation(&db, &new, CreatePolicy::Strict)
            .await
            .unwrap();

        let err = create_conversation(&db, &new, CreatePolicy::Strict)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ParleyError::AlreadyExists { entity: "conversation", ref key } if key == "property/p9"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn create_new_always_inserts() {
        let (db, _dir) = open_db().await;
        let new = new_conversation("session", Some("s1"), None, "s1");
        let (a, _) = create_conversation(&db, &new, CreatePolicy::CreateNew)
            .await
            .unwrap();
        let (b, _) = create_conversation(&db, &new, CreatePolicy::CreateNew)
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn find_filters_by_agent_only_when_asked() {
        let (db, _dir) = open_db().await;
        let cia = new_conversation("user", Some("u1"), Some(AgentType::Cia), "u1");
        let iris = new_conversation("user", Some("u1"), Some(AgentType::Iris), "u1");
        let (cia_conv, _) = create_conversation(&db, &cia, CreatePolicy::CreateNew)
            .await
            .unwrap();
        let (iris_conv, _) = create_conversation(&db, &iris, CreatePolicy::CreateNew)
            .await
            .unwrap();

        let found = find_conversation(&db, "user", Some("u1"), Some(AgentType::Cia))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, cia_conv.id);

        let any = find_conversation(&db, "user", Some("u1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(any.id, iris_conv.id, "latest conversation wins");

        let none = find_conversation(&db, "user", Some("u2"), None).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn participant_join_is_idempotent() {
        let (db, _dir) = open_db().await;
        let new = new_conversation("property", Some("p1"), None, "u1");
        let (conv, _) = create_conversation(&db, &new, CreatePolicy::CreateNew)
            .await
            .unwrap();

        add_participant(&db, &conv.id, "CIA", Role::Agent).await.unwrap();
        add_participant(&db, &conv.id, "CIA", Role::Agent).await.unwrap();
        add_participant(&db, &conv.id, "u1", Role::System).await.unwrap();

        let participants = list_participants(&db, &conv.id).await.unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].role, Role::User, "first join keeps its role");
        assert_eq!(participants[1].identity_id, "CIA");
    }

    #[tokio::test]
    async fn add_participant_to_missing_conversation_is_not_found() {
        let (db, _dir) = open_db().await;
        let err = add_participant(&db, "nope", "u1", Role::User)
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::NotFound { .. }));
    }

    #[tokio::test]
    async fn lists_conversations_for_participant() {
        let (db, _dir) = open_db().await;
        let (a, _) = create_conversation(
            &db,
            &new_conversation("property", Some("p1"), None, "u1"),
            CreatePolicy::CreateNew,
        )
        .await
        .unwrap();
        let (b, _) = create_conversation(
            &db,
            &new_conversation("property", Some("p2"), None, "u1"),
            CreatePolicy::CreateNew,
        )
        .await
        .unwrap();
        create_conversation(
            &db,
            &new_conversation("property", Some("p3"), None, "u2"),
            CreatePolicy::CreateNew,
        )
        .await
        .unwrap();

        let listed = list_conversations_for_participant(&db, "u1").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);
    }

    #[tokio::test]
    async fn empty_participant_is_rejected() {
        let (db, _dir) = open_db().await;
        let new = new_conversation("property", Some("p1"), None, "");
        let err = create_conversation(&db, &new, CreatePolicy::CreateNew)
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::InvalidInput(_)));
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message log.
//!
//! `seq` is assigned inside an immediate transaction on the single writer, so
//! two appends to the same conversation can never observe the same maximum.

use parley_core::{Message, MessageCursor, NewMessage, ParleyError};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use crate::database::{map_tr_err, map_tx_err, Database, TxError};
use crate::queries::{enum_column, ensure_conversation, json_column, json_text};

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, seq, sender_type, sender_id, content, metadata, created_at";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        seq: row.get(2)?,
        sender_type: enum_column(row, 3)?,
        sender_id: row.get(4)?,
        content: row.get(5)?,
        metadata: json_column(row, 6)?,
        created_at: row.get(7)?,
    })
}

/// Append a message, assigning the next `seq` and a non-decreasing `created_at`.
pub async fn append_message(
    db: &Database,
    conversation_id: &str,
    message: &NewMessage,
) -> Result<Message, ParleyError> {
    message.validate()?;

    let conversation_id = conversation_id.to_string();
    let message = message.clone();
    db.connection()
        .call(move |conn| -> Result<Message, TxError> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_conversation(&tx, &conversation_id)?;

            let has_participants: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM participants WHERE conversation_id = ?1)",
                [&conversation_id],
                |row| row.get(0),
            )?;
            if !has_participants {
                return Err(ParleyError::InvalidInput(format!(
                    "conversation {conversation_id} has no participants"
                ))
                .into());
            }

            let (next_seq, last_created): (i64, Option<String>) = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1, MAX(created_at)
                 FROM messages WHERE conversation_id = ?1",
                [&conversation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO messages
                     (id, conversation_id, seq, sender_type, sender_id, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                         MAX(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), COALESCE(?8, '')))",
                params![
                    id,
                    conversation_id,
                    next_seq,
                    message.sender_type.to_string(),
                    message.sender_id,
                    message.content,
                    json_text(message.metadata.as_ref()),
                    last_created,
                ],
            )?;

            let stored = tx.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [&id],
                message_from_row,
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = MAX(updated_at, ?2) WHERE id = ?1",
                params![conversation_id, stored.created_at],
            )?;
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_tx_err)
}

/// Get a message by ID.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, ParleyError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [&id],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Messages in ascending `seq`, strictly after `since` when given.
pub async fn list_messages(
    db: &Database,
    conversation_id: &str,
    since: Option<&MessageCursor>,
    limit: Option<i64>,
) -> Result<Vec<Message>, ParleyError> {
    if let Some(limit) = limit
        && limit < 0
    {
        return Err(ParleyError::InvalidInput(format!(
            "limit must not be negative, got {limit}"
        )));
    }

    let conversation_id = conversation_id.to_string();
    let since = since.cloned();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, TxError> {
            ensure_conversation(conn, &conversation_id)?;

            let after_seq = match since {
                None => 0,
                Some(MessageCursor::AfterSeq(seq)) => seq,
                Some(MessageCursor::AfterMessage(message_id)) => conn
                    .query_row(
                        "SELECT seq FROM messages WHERE id = ?1 AND conversation_id = ?2",
                        [&message_id, &conversation_id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| ParleyError::not_found("message", message_id))?,
            };

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND seq > ?2
                 ORDER BY seq ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(
                params![conversation_id, after_seq, limit.unwrap_or(-1)],
                message_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
        .map_err(map_tx_err)
}

/// The last `count` messages, oldest first.
pub async fn recent_messages(
    db: &Database,
    conversation_id: &str,
    count: i64,
) -> Result<Vec<Message>, ParleyError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, TxError> {
            ensure_conversation(conn, &conversation_id)?;
            if count <= 0 {
                return Ok(Vec::new());
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                     SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY seq DESC
                     LIMIT ?2
                 ) ORDER BY seq ASC"
            ))?;
            let rows = stmt.query_map(params![conversation_id, count], message_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
        .map_err(map_tx_err)
}

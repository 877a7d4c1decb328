// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment metadata. Blobs live elsewhere; rows only hold a pointer.

use parley_core::{Attachment, NewAttachment, ParleyError};
use rusqlite::params;
use uuid::Uuid;

use crate::database::{map_tr_err, map_tx_err, Database, TxError};
use crate::queries::{enum_column, exists, json_column, json_text};

const ATTACHMENT_COLUMNS: &str =
    "a.id, a.message_id, a.kind, a.storage_ref, a.mime_type, a.size_bytes, a.metadata, a.created_at";

fn attachment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        message_id: row.get(1)?,
        kind: enum_column(row, 2)?,
        storage_ref: row.get(3)?,
        mime_type: row.get(4)?,
        size_bytes: row.get(5)?,
        metadata: json_column(row, 6)?,
        created_at: row.get(7)?,
    })
}

/// Record an attachment for an existing message.
pub async fn add_attachment(
    db: &Database,
    message_id: &str,
    attachment: &NewAttachment,
) -> Result<Attachment, ParleyError> {
    attachment.validate()?;

    let message_id = message_id.to_string();
    let attachment = attachment.clone();
    db.connection()
        .call(move |conn| -> Result<Attachment, TxError> {
            if !exists(conn, "messages", &message_id)? {
                return Err(ParleyError::not_found("message", message_id).into());
            }
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO attachments
                     (id, message_id, kind, storage_ref, mime_type, size_bytes, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    message_id,
                    attachment.kind.to_string(),
                    attachment.storage_ref,
                    attachment.mime_type,
                    attachment.size_bytes,
                    json_text(attachment.metadata.as_ref()),
                ],
            )?;
            Ok(conn.query_row(
                &format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments a WHERE a.id = ?1"),
                [&id],
                attachment_from_row,
            )?)
        })
        .await
        .map_err(map_tx_err)
}

/// Attachments of one message, in upload order.
pub async fn list_attachments(
    db: &Database,
    message_id: &str,
) -> Result<Vec<Attachment>, ParleyError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Attachment>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachments a
                 WHERE a.message_id = ?1 ORDER BY a.rowid ASC"
            ))?;
            let rows = stmt.query_map([&message_id], attachment_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// `(message_id, attachment)` pairs ordered by message `seq`, then upload order.
pub async fn list_attachments_for_conversation(
    db: &Database,
    conversation_id: &str,
) -> Result<Vec<(String, Attachment)>, ParleyError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<(String, Attachment)>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachments a
                 JOIN messages m ON m.id = a.message_id
                 WHERE m.conversation_id = ?1
                 ORDER BY m.seq ASC, a.rowid ASC"
            ))?;
            let rows = stmt.query_map([&conversation_id], |row| {
                let attachment = attachment_from_row(row)?;
                Ok((attachment.message_id.clone(), attachment))
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations::create_conversation;
    use crate::queries::messages::append_message;
    use crate::test_support::{new_conversation, open_db, user_message};
    use parley_core::{AttachmentKind, CreatePolicy};

    fn photo(name: &str, size: i64) -> NewAttachment {
        NewAttachment {
            kind: AttachmentKind::Image,
            storage_ref: format!("s3://uploads/{name}"),
            mime_type: "image/jpeg".into(),
            size_bytes: size,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn attachments_follow_message_then_upload_order() {
        let (db, _dir) = open_db().await;
        let (conv, _) = create_conversation(
            &db,
            &new_conversation("property", Some("p1"), None, "u1"),
            CreatePolicy::CreateNew,
        )
        .await
        .unwrap();
        let first = append_message(&db, &conv.id, &user_message("u1", "see photos"))
            .await
            .unwrap();
        let second = append_message(&db, &conv.id, &user_message("u1", "and this"))
            .await
            .unwrap();

        // Upload for the later message first.
        add_attachment(&db, &second.id, &photo("c.jpg", 30)).await.unwrap();
        add_attachment(&db, &first.id, &photo("a.jpg", 10)).await.unwrap();
        add_attachment(&db, &first.id, &photo("b.jpg", 20)).await.unwrap();

        let per_message = list_attachments(&db, &first.id).await.unwrap();
        let refs: Vec<_> = per_message.iter().map(|a| a.storage_ref.as_str()).collect();
        assert_eq!(refs, vec!["s3://uploads/a.jpg", "s3://uploads/b.jpg"]);

        let all = list_attachments_for_conversation(&db, &conv.id).await.unwrap();
        let order: Vec<_> = all
            .iter()
            .map(|(message_id, a)| (message_id.as_str(), a.size_bytes))
            .collect();
        assert_eq!(
            order,
            vec![
                (first.id.as_str(), 10),
                (first.id.as_str(), 20),
                (second.id.as_str(), 30)
            ]
        );
    }

    #[tokio::test]
    async fn attachment_for_missing_message_is_not_found() {
        let (db, _dir) = open_db().await;
        let err = add_attachment(&db, "nope", &photo("x.jpg", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::NotFound { entity: "message", .. }));
    }

    #[tokio::test]
    async fn negative_size_is_rejected_before_lookup() {
        let (db, _dir) = open_db().await;
        let err = add_attachment(&db, "any", &photo("x.jpg", -1))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::InvalidInput(_)));
    }
}

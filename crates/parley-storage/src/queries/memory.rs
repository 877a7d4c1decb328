// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation-scoped memory entries.
//!
//! A write reads the current value, merges, checks the optional expected
//! version, and upserts in a single immediate transaction.

use parley_core::{memory, MemoryEntry, MemoryWrite, ParleyError};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde_json::Value;

use crate::database::{map_tx_err, Database, TxError};
use crate::queries::ensure_conversation;

const MEMORY_COLUMNS: &str =
    "conversation_id, key, value, version, updated_by, created_at, updated_at";

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let raw: String = row.get(2)?;
    let value = serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(MemoryEntry {
        conversation_id: row.get(0)?,
        key: row.get(1)?,
        value,
        version: row.get(3)?,
        updated_by: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn select_entry(
    conn: &rusqlite::Connection,
    conversation_id: &str,
    key: &str,
) -> rusqlite::Result<Option<MemoryEntry>> {
    conn.query_row(
        &format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_entries WHERE conversation_id = ?1 AND key = ?2"
        ),
        [conversation_id, key],
        entry_from_row,
    )
    .optional()
}

/// Read a single memory key.
pub async fn get_memory(
    db: &Database,
    conversation_id: &str,
    key: &str,
) -> Result<Option<MemoryEntry>, ParleyError> {
    let conversation_id = conversation_id.to_string();
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MemoryEntry>, TxError> {
            ensure_conversation(conn, &conversation_id)?;
            Ok(select_entry(conn, &conversation_id, &key)?)
        })
        .await
        .map_err(map_tx_err)
}

/// Apply `write` to the stored value and return the new entry.
pub async fn put_memory(
    db: &Database,
    conversation_id: &str,
    write: &MemoryWrite,
) -> Result<MemoryEntry, ParleyError> {
    if write.key.trim().is_empty() {
        return Err(ParleyError::InvalidInput(
            "memory key must not be empty".into(),
        ));
    }
    memory::validate(&write.key, &write.value)?;

    let conversation_id = conversation_id.to_string();
    let write = write.clone();
    db.connection()
        .call(move |conn| -> Result<MemoryEntry, TxError> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_conversation(&tx, &conversation_id)?;

            let current = select_entry(&tx, &conversation_id, &write.key)?;
            let current_version = current.as_ref().map_or(0, |entry| entry.version);
            if let Some(expected) = write.expected_version
                && expected != current_version
            {
                return Err(ParleyError::VersionConflict {
                    key: write.key,
                    expected,
                    actual: current_version,
                }
                .into());
            }

            let merged: Value = write
                .strategy
                .apply(current.map(|entry| entry.value), write.value);
            memory::validate(&write.key, &merged)?;

            tx.execute(
                "INSERT INTO memory_entries (conversation_id, key, value, version, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (conversation_id, key) DO UPDATE SET
                     value = excluded.value,
                     version = excluded.version,
                     updated_by = excluded.updated_by,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    conversation_id,
                    write.key,
                    merged.to_string(),
                    current_version + 1,
                    write.written_by,
                ],
            )?;

            let entry = select_entry(&tx, &conversation_id, &write.key)?.ok_or_else(|| {
                ParleyError::Internal(format!("memory key {} vanished", write.key))
            })?;
            tx.commit()?;
            Ok(entry)
        })
        .await
        .map_err(map_tx_err)
}

/// Every memory entry of a conversation, ordered by key.
pub async fn list_memory(
    db: &Database,
    conversation_id: &str,
) -> Result<Vec<MemoryEntry>, ParleyError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<MemoryEntry>, TxError> {
            ensure_conversation(conn, &conversation_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memory_entries
                 WHERE conversation_id = ?1 ORDER BY key ASC"
            ))?;
            let rows = stmt.query_map([&conversation_id], entry_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
        .map_err(map_tx_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations::create_conversation;
    use crate::test_support::{new_conversation, open_db};
    use parley_core::{CreatePolicy, MergeStrategy};
    use serde_json::json;

    async fn setup() -> (Database, tempfile::TempDir, String) {
        let (db, dir) = open_db().await;
        let (conv, _) = create_conversation(
            &db,
            &new_conversation("user", Some("u1"), None, "u1"),
            CreatePolicy::CreateNew,
        )
        .await
        .unwrap();
        (db, dir, conv.id)
    }

    #[tokio::test]
    async fn replace_overwrites_and_bumps_version() {
        let (db, _dir, conv) = setup().await;

        let first = put_memory(
            &db,
            &conv,
            &MemoryWrite::new("project_stage", json!("planning"), MergeStrategy::Replace),
        )
        .await
        .unwrap();
        assert_eq!(first.version, 1);

        let second = put_memory(
            &db,
            &conv,
            &MemoryWrite::new("project_stage", json!("bidding"), MergeStrategy::Replace)
                .written_by("CIA"),
        )
        .await
        .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.value, json!("bidding"));
        assert_eq!(second.updated_by.as_deref(), Some("CIA"));
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn shallow_merge_unions_object_keys() {
        let (db, _dir, conv) = setup().await;

        put_memory(
            &db,
            &conv,
            &MemoryWrite::new(
                "contact_info",
                json!({"email": "a@x.io"}),
                MergeStrategy::ShallowMerge,
            ),
        )
        .await
        .unwrap();
        let merged = put_memory(
            &db,
            &conv,
            &MemoryWrite::new(
                "contact_info",
                json!({"phone": "555"}),
                MergeStrategy::ShallowMerge,
            ),
        )
        .await
        .unwrap();

        assert_eq!(merged.value, json!({"email": "a@x.io", "phone": "555"}));
        assert_eq!(merged.version, 2);
    }

    #[tokio::test]
    async fn expected_version_guards_writes() {
        let (db, _dir, conv) = setup().await;

        let created = put_memory(
            &db,
            &conv,
            &MemoryWrite::new("budget", json!(10_000), MergeStrategy::Replace).expect_version(0),
        )
        .await
        .unwrap();
        assert_eq!(created.version, 1);

        let err = put_memory(
            &db,
            &conv,
            &MemoryWrite::new("budget", json!(12_000), MergeStrategy::Replace).expect_version(0),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, ParleyError::VersionConflict { expected: 0, actual: 1, .. }),
            "got {err:?}"
        );

        let updated = put_memory(
            &db,
            &conv,
            &MemoryWrite::new("budget", json!(12_000), MergeStrategy::Replace).expect_version(1),
        )
        .await
        .unwrap();
        assert_eq!(updated.version, 2);

        let stored = get_memory(&db, &conv, "budget").await.unwrap().unwrap();
        assert_eq!(stored.value, json!(12_000));
    }

    #[tokio::test]
    async fn typed_keys_reject_wrong_shapes() {
        let (db, _dir, conv) = setup().await;
        let err = put_memory(
            &db,
            &conv,
            &MemoryWrite::new("style_preferences", json!("modern"), MergeStrategy::Replace),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParleyError::InvalidInput(_)));
        assert!(get_memory(&db, &conv, "style_preferences")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn missing_conversation_is_not_found() {
        let (db, _dir) = open_db().await;
        let err = put_memory(
            &db,
            "missing",
            &MemoryWrite::new("k", json!(1), MergeStrategy::Replace),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParleyError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_memory_is_ordered_by_key() {
        let (db, _dir, conv) = setup().await;
        for key in ["zeta", "alpha", "mid"] {
            put_memory(
                &db,
                &conv,
                &MemoryWrite::new(key, json!(key), MergeStrategy::Replace),
            )
            .await
            .unwrap();
        }
        let keys: Vec<_> = list_memory(&db, &conv)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn concurrent_shallow_merges_keep_every_key() {
        let (db, _dir, conv) = setup().await;
        let db = std::sync::Arc::new(db);

        let mut handles = Vec::new();
        for i in 0..10 {
            let db = db.clone();
            let conv = conv.clone();
            handles.push(tokio::spawn(async move {
                let mut patch = serde_json::Map::new();
                patch.insert(format!("k{i}"), json!(i));
                put_memory(
                    &db,
                    &conv,
                    &MemoryWrite::new(
                        "project_context",
                        Value::Object(patch),
                        MergeStrategy::ShallowMerge,
                    ),
                )
                .await
                .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entry = get_memory(&db, &conv, "project_context")
            .await
            .unwrap()
            .unwrap();
        let object = entry.value.as_object().unwrap();
        assert_eq!(object.len(), 10);
        assert_eq!(entry.version, 10);
    }
}

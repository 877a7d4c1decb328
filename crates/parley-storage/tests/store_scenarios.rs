// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end store behavior through the public `StorageAdapter` surface.

use std::sync::Arc;

use parley_config::model::StorageConfig;
use parley_core::{
    AttachmentKind, CreatePolicy, MemoryWrite, MergeStrategy, NewAttachment, NewConversation,
    NewMessage, ParleyError, Role, StorageAdapter,
};
use parley_storage::SqliteStorage;
use serde_json::{json, Value};
use tempfile::TempDir;

async fn storage() -> (Arc<SqliteStorage>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::new(StorageConfig {
        database_path: dir.path().join("parley.db").to_string_lossy().into_owned(),
        wal_mode: true,
        busy_timeout_ms: 1000,
    });
    storage.initialize().await.unwrap();
    (Arc::new(storage), dir)
}

async fn property_conversation(storage: &SqliteStorage) -> String {
    let (conv, created) = storage
        .create_conversation(
            &NewConversation {
                entity_type: "property".into(),
                entity_id: Some("p1".into()),
                agent_type: None,
                participant_id: "u1".into(),
                participant_role: Role::User,
            },
            CreatePolicy::FindOrCreate,
        )
        .await
        .unwrap();
    assert!(created);
    conv.id
}

#[tokio::test]
async fn appended_message_is_listed_back() {
    let (storage, _dir) = storage().await;
    let conv = property_conversation(&storage).await;

    let message = storage
        .append_message(
            &conv,
            &NewMessage {
                sender_type: Role::User,
                sender_id: "u1".into(),
                content: "hello".into(),
                metadata: None,
            },
        )
        .await
        .unwrap();

    let listed = storage.list_messages(&conv, None, None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, message.id);
    assert_eq!(listed[0].content, "hello");
    assert_eq!(listed[0].created_at, message.created_at);

    // Repeated listing never reorders.
    assert_eq!(storage.list_messages(&conv, None, None).await.unwrap(), listed);
}

#[tokio::test]
async fn replace_round_trips_style_preferences() {
    let (storage, _dir) = storage().await;
    let conv = property_conversation(&storage).await;

    storage
        .put_memory(
            &conv,
            &MemoryWrite::new(
                "style_preferences",
                json!(["modern", "farmhouse"]),
                MergeStrategy::Replace,
            ),
        )
        .await
        .unwrap();

    let entry = storage
        .get_memory(&conv, "style_preferences")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.value, json!(["modern", "farmhouse"]));
}

#[tokio::test]
async fn attachment_on_missing_message_is_not_found() {
    let (storage, _dir) = storage().await;
    let err = storage
        .add_attachment(
            "nonexistent-message",
            &NewAttachment {
                kind: AttachmentKind::Document,
                storage_ref: "s3://docs/quote.pdf".into(),
                mime_type: "application/pdf".into(),
                size_bytes: 2048,
                metadata: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::NotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn concurrent_shallow_merges_from_two_requests_both_land() {
    let (storage, _dir) = storage().await;
    let conv = property_conversation(&storage).await;

    let write = |patch: Value| {
        let storage = storage.clone();
        let conv = conv.clone();
        tokio::spawn(async move {
            storage
                .put_memory(
                    &conv,
                    &MemoryWrite::new("contact_info", patch, MergeStrategy::ShallowMerge),
                )
                .await
        })
    };
    let a = write(json!({"email": "owner@example.com"}));
    let b = write(json!({"phone": "555-0100"}));
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let entry = storage
        .get_memory(&conv, "contact_info")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        entry.value,
        json!({"email": "owner@example.com", "phone": "555-0100"})
    );
    assert_eq!(entry.version, 2);
}

#[tokio::test]
async fn concurrent_appends_form_a_total_order() {
    let (storage, _dir) = storage().await;
    let conv = property_conversation(&storage).await;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let storage = storage.clone();
            let conv = conv.clone();
            tokio::spawn(async move {
                storage
                    .append_message(
                        &conv,
                        &NewMessage {
                            sender_type: Role::User,
                            sender_id: "u1".into(),
                            content: format!("burst {i}"),
                            metadata: None,
                        },
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let listed = storage.list_messages(&conv, None, None).await.unwrap();
    assert_eq!(listed.len(), 16);
    let seqs: Vec<_> = listed.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, (1..=16).collect::<Vec<i64>>());
    assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lazy paging over a conversation's message log.

use futures::stream::{self, Stream, TryStreamExt};
use parley_core::{Message, MessageCursor, ParleyError, StorageAdapter};

/// Stream every message of a conversation in `seq` order, one page at a time.
///
/// Pages are fetched only as the stream is polled. Messages appended while the
/// stream is open are picked up by later pages.
pub fn message_stream<'a>(
    storage: &'a dyn StorageAdapter,
    conversation_id: &'a str,
    page_size: i64,
) -> impl Stream<Item = Result<Message, ParleyError>> + Send + 'a {
    message_stream_after(storage, conversation_id, 0, page_size)
}

/// Like [`message_stream`], starting after `after_seq`.
///
/// Resuming an interrupted stream from the last `seq` it yielded produces
/// exactly the remaining messages.
pub fn message_stream_after<'a>(
    storage: &'a dyn StorageAdapter,
    conversation_id: &'a str,
    after_seq: i64,
    page_size: i64,
) -> impl Stream<Item = Result<Message, ParleyError>> + Send + 'a {
    let page_size = page_size.max(1);
    stream::try_unfold(Some(after_seq), move |cursor| async move {
        let Some(after) = cursor else {
            return Ok(None);
        };
        let page = storage
            .list_messages(
                conversation_id,
                Some(&MessageCursor::AfterSeq(after)),
                Some(page_size),
            )
            .await?;
        let Some(last_seq) = page.last().map(|m| m.seq) else {
            return Ok(None);
        };
        let next = (page.len() as i64 == page_size).then_some(last_seq);
        Ok(Some((stream::iter(page.into_iter().map(Ok)), next)))
    })
    .try_flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_storage, user_message};
    use crate::SqliteStorage;
    use futures::StreamExt;
    use parley_core::{CreatePolicy, StorageAdapter};

    async fn seeded(count: usize) -> (SqliteStorage, tempfile::TempDir, String) {
        let (storage, dir) = open_storage().await;
        let (conv, _) = storage
            .create_conversation(
                &crate::test_support::new_conversation("property", Some("p1"), None, "u1"),
                CreatePolicy::CreateNew,
            )
            .await
            .unwrap();
        for i in 0..count {
            storage
                .append_message(&conv.id, &user_message("u1", &format!("m{i}")))
                .await
                .unwrap();
        }
        (storage, dir, conv.id)
    }

    #[tokio::test]
    async fn streams_all_messages_across_pages() {
        let (storage, _dir, conv) = seeded(7).await;
        let messages: Vec<Message> = message_stream(&storage, &conv, 3)
            .try_collect()
            .await
            .unwrap();
        let seqs: Vec<_> = messages.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, (1..=7).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn stream_is_lazy_and_resumable() {
        let (storage, _dir, conv) = seeded(5).await;

        let first_two: Vec<Message> = message_stream(&storage, &conv, 2)
            .take(2)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(first_two.len(), 2);

        let rest: Vec<Message> = message_stream_after(&storage, &conv, first_two[1].seq, 2)
            .try_collect()
            .await
            .unwrap();
        let seqs: Vec<_> = rest.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn empty_conversation_yields_nothing() {
        let (storage, _dir, conv) = seeded(0).await;
        let messages: Vec<Message> = message_stream(&storage, &conv, 10)
            .try_collect()
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn unknown_conversation_surfaces_error() {
        let (storage, _dir) = open_storage().await;
        let mut stream = Box::pin(message_stream(&storage, "missing", 10));
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(ParleyError::NotFound { .. })));
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley conversation store.
//!
//! This crate provides the error taxonomy, the domain types shared by the
//! stores and the state adapters, the memory merge law, and the
//! [`StorageAdapter`] trait implemented by persistence backends.

pub mod error;
pub mod memory;
pub mod merge;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{FailedWrite, ParleyError, PartialPersist, WriteKind};
pub use memory::MemoryValue;
pub use merge::MergeStrategy;
pub use types::{
    AdapterType, AgentType, Attachment, AttachmentKind, Conversation, CreatePolicy,
    HealthStatus, IdentityKey, IdentityKind, MemoryEntry, MemoryWrite, Message, MessageCursor,
    NewAttachment, NewConversation, NewMessage, Participant, Role,
};

pub use traits::{PluginAdapter, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parley_error_has_taxonomy_variants() {
        let _not_found = ParleyError::not_found("conversation", "c1");
        let _exists = ParleyError::AlreadyExists {
            entity: "conversation",
            key: "property/p1".into(),
        };
        let _unavailable = ParleyError::StorageUnavailable {
            source: Box::new(std::io::Error::other("test")),
        };
        let _partial = ParleyError::PartialPersistFailure(Box::new(PartialPersist {
            conversation_id: "c1".into(),
            saved_message_ids: vec![],
            saved_memory_keys: vec![],
            failures: vec![],
        }));
        let _conflict = ParleyError::VersionConflict {
            key: "k".into(),
            expected: 1,
            actual: 2,
        };
        let _denied = ParleyError::AccessDenied {
            agent: "CIA".into(),
            key: "bsa.draft".into(),
        };
        let _timeout = ParleyError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
    }

    #[test]
    fn adapter_type_round_trip() {
        use std::str::FromStr;

        for variant in [AdapterType::Storage, AdapterType::Gateway] {
            let s = variant.to_string();
            assert_eq!(AdapterType::from_str(&s).unwrap(), variant);
        }
    }

    #[test]
    fn storage_trait_is_object_safe() {
        fn _assert_dyn(_: &dyn StorageAdapter) {}
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The state an agent resumes a conversation with.

use std::collections::BTreeMap;

use parley_core::memory::{CONTACT_INFO, ContactInfo, STYLE_PREFERENCES};
use parley_core::{AgentType, IdentityKey, MemoryEntry, MemoryValue, Message};
use serde::Serialize;
use serde_json::Value;

/// Recent history plus the memory an agent is allowed to see.
///
/// Plain data: restoring twice without an intervening write yields equal values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentState {
    pub agent_type: AgentType,
    pub identity: IdentityKey,
    /// `None` until the identity has talked to anyone.
    pub conversation_id: Option<String>,
    /// Oldest first.
    pub messages: Vec<Message>,
    pub memory: BTreeMap<String, Value>,
    /// Version of each entry in `memory`, for optimistic writes.
    pub memory_versions: BTreeMap<String, i64>,
}

impl AgentState {
    /// State for an identity with no conversation yet.
    pub fn empty(agent_type: AgentType, identity: IdentityKey) -> Self {
        Self {
            agent_type,
            identity,
            conversation_id: None,
            messages: Vec::new(),
            memory: BTreeMap::new(),
            memory_versions: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conversation_id.is_none() && self.messages.is_empty() && self.memory.is_empty()
    }

    pub(crate) fn insert_memory(&mut self, entry: MemoryEntry) {
        self.memory_versions.insert(entry.key.clone(), entry.version);
        self.memory.insert(entry.key, entry.value);
    }

    /// `style_preferences`, if present and well-formed.
    pub fn style_preferences(&self) -> Option<Vec<String>> {
        match self.typed(STYLE_PREFERENCES)? {
            MemoryValue::StylePreferences(styles) => Some(styles),
            _ => None,
        }
    }

    /// `contact_info`, if present and well-formed.
    pub fn contact_info(&self) -> Option<ContactInfo> {
        match self.typed(CONTACT_INFO)? {
            MemoryValue::ContactInfo(info) => Some(info),
            _ => None,
        }
    }

    fn typed(&self, key: &str) -> Option<MemoryValue> {
        let value = self.memory.get(key)?.clone();
        MemoryValue::parse(key, value).ok()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(key: &str, value: Value, version: i64) -> MemoryEntry {
        MemoryEntry {
            conversation_id: "c1".into(),
            key: key.into(),
            value,
            version,
            updated_by: Some("CIA".into()),
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn empty_state_has_nothing() {
        let state = AgentState::empty(AgentType::Cia, IdentityKey::user("u1"));
        assert!(state.is_empty());
        assert!(state.style_preferences().is_none());
    }

    #[test]
    fn typed_accessors_read_known_keys() {
        let mut state = AgentState::empty(AgentType::Iris, IdentityKey::user("u1"));
        state.insert_memory(entry(STYLE_PREFERENCES, json!(["modern", "farmhouse"]), 2));
        state.insert_memory(entry(CONTACT_INFO, json!({"phone": "555-0100"}), 1));

        assert_eq!(
            state.style_preferences(),
            Some(vec!["modern".to_string(), "farmhouse".to_string()])
        );
        assert_eq!(
            state.contact_info().and_then(|c| c.phone).as_deref(),
            Some("555-0100")
        );
        assert_eq!(state.memory_versions[STYLE_PREFERENCES], 2);
    }

    #[test]
    fn malformed_known_key_reads_as_absent() {
        let mut state = AgentState::empty(AgentType::Iris, IdentityKey::user("u1"));
        state.insert_memory(entry(STYLE_PREFERENCES, json!("modern"), 1));
        assert!(state.style_preferences().is_none());
        assert_eq!(state.memory[STYLE_PREFERENCES], json!("modern"));
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed shapes for well-known memory keys.
//!
//! Memory values are JSON on disk. Keys listed here have a fixed shape that is
//! checked before a write; every other key is stored as opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParleyError;

pub const STYLE_PREFERENCES: &str = "style_preferences";
pub const CONTACT_INFO: &str = "contact_info";

/// Contact details gathered across agents. Every field is optional so that
/// agents can shallow-merge the parts they learned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_contact_method: Option<String>,
}

/// A memory value, typed where the key is known.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValue {
    StylePreferences(Vec<String>),
    ContactInfo(ContactInfo),
    Opaque(Value),
}

impl MemoryValue {
    /// Interpret `value` according to the shape registered for `key`.
    pub fn parse(key: &str, value: Value) -> Result<Self, ParleyError> {
        match key {
            STYLE_PREFERENCES => serde_json::from_value(value)
                .map(MemoryValue::StylePreferences)
                .map_err(|e| shape_error(key, "a list of strings", e)),
            CONTACT_INFO => serde_json::from_value(value)
                .map(MemoryValue::ContactInfo)
                .map_err(|e| shape_error(key, "a contact record", e)),
            _ => Ok(MemoryValue::Opaque(value)),
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            MemoryValue::StylePreferences(styles) => {
                Value::Array(styles.into_iter().map(Value::String).collect())
            }
            // Serializing a struct of optional strings cannot fail.
            MemoryValue::ContactInfo(info) => serde_json::to_value(info).unwrap_or(Value::Null),
            MemoryValue::Opaque(value) => value,
        }
    }
}

/// Reject `value` if `key` is a known key and the shape does not match.
pub fn validate(key: &str, value: &Value) -> Result<(), ParleyError> {
    if is_known_key(key) {
        MemoryValue::parse(key, value.clone())?;
    }
    Ok(())
}

pub fn is_known_key(key: &str) -> bool {
    matches!(key, STYLE_PREFERENCES | CONTACT_INFO)
}

fn shape_error(key: &str, expected: &str, err: serde_json::Error) -> ParleyError {
    ParleyError::InvalidInput(format!("memory key `{key}` must be {expected}: {err}"))
}

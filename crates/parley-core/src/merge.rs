// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merge strategies for memory writes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// How a memory write combines with the value already stored under the key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// The new value overwrites the old one.
    #[default]
    Replace,
    /// Top-level object keys are merged, new keys win. Arrays and scalars are
    /// replaced wholesale.
    ShallowMerge,
}

impl MergeStrategy {
    /// Combine `incoming` with the `existing` value according to this strategy.
    pub fn apply(self, existing: Option<Value>, incoming: Value) -> Value {
        match (self, existing, incoming) {
            (MergeStrategy::ShallowMerge, Some(Value::Object(mut base)), Value::Object(patch)) => {
                for (key, value) in patch {
                    base.insert(key, value);
                }
                Value::Object(base)
            }
            (_, _, incoming) => incoming,
        }
    }
}

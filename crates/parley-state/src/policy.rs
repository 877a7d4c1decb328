// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static memory policy: per-key merge strategies and the agent capability table.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use parley_config::model::{AccessDefault, MemoryConfig};
use parley_core::{AgentType, MergeStrategy, ParleyError};

/// Which strategy each memory key merges with, and which agent may touch which key.
#[derive(Debug, Clone)]
pub struct MemoryPolicy {
    strategies: BTreeMap<String, MergeStrategy>,
    default_strategy: MergeStrategy,
    access: HashMap<AgentType, Vec<String>>,
    default_access: AccessDefault,
}

impl MemoryPolicy {
    /// Build the policy from `[memory]`. Unknown agent names are a config error.
    pub fn from_config(config: &MemoryConfig) -> Result<Self, ParleyError> {
        let mut access = HashMap::new();
        for (name, prefixes) in &config.access {
            let agent = AgentType::from_str(name).map_err(|_| {
                ParleyError::Config(format!("memory.access: unknown agent type `{name}`"))
            })?;
            access.insert(agent, prefixes.clone());
        }
        Ok(Self {
            strategies: config.policies.clone(),
            default_strategy: config.default_strategy,
            access,
            default_access: config.default_access,
        })
    }

    /// Strategy used when a write does not name one.
    pub fn strategy_for(&self, key: &str) -> MergeStrategy {
        self.strategies
            .get(key)
            .copied()
            .unwrap_or(self.default_strategy)
    }

    /// Whether `agent` may read and write `key`.
    pub fn allows(&self, agent: AgentType, key: &str) -> bool {
        match self.access.get(&agent) {
            Some(prefixes) => prefixes.iter().any(|prefix| key.starts_with(prefix.as_str())),
            None => self.default_access == AccessDefault::Allow,
        }
    }

    pub fn check_access(&self, agent: AgentType, key: &str) -> Result<(), ParleyError> {
        if self.allows(agent, key) {
            Ok(())
        } else {
            Err(ParleyError::AccessDenied {
                agent: agent.to_string(),
                key: key.to_string(),
            })
        }
    }
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            strategies: MemoryConfig::default().policies,
            default_strategy: MergeStrategy::default(),
            access: HashMap::new(),
            default_access: AccessDefault::Allow,
        }
    }
}

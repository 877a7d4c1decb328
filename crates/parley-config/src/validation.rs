// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, retry bounds, and known agent names.

use std::str::FromStr;

use parley_core::AgentType;

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const MAX_ATTEMPTS_CEILING: u32 = 10;
const RECENT_MESSAGES_CEILING: usize = 1000;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.gateway.request_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "gateway.request_timeout_secs must be at least 1",
        ));
    }

    if let Some(token) = &config.gateway.bearer_token
        && token.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "gateway.bearer_token must not be blank; remove it to disable access",
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    let recent = config.restore.recent_messages;
    if recent == 0 || recent > RECENT_MESSAGES_CEILING {
        errors.push(ConfigError::validation(format!(
            "restore.recent_messages must be between 1 and {RECENT_MESSAGES_CEILING}, got {recent}"
        )));
    }

    let attempts = config.persist.max_attempts;
    if attempts == 0 || attempts > MAX_ATTEMPTS_CEILING {
        errors.push(ConfigError::validation(format!(
            "persist.max_attempts must be between 1 and {MAX_ATTEMPTS_CEILING}, got {attempts}"
        )));
    }

    if config.persist.initial_backoff_ms > config.persist.max_backoff_ms {
        errors.push(ConfigError::validation(format!(
            "persist.initial_backoff_ms ({}) must not exceed persist.max_backoff_ms ({})",
            config.persist.initial_backoff_ms, config.persist.max_backoff_ms
        )));
    }

    for key in config.memory.policies.keys() {
        if key.trim().is_empty() {
            errors.push(ConfigError::validation(
                "memory.policies contains an empty key",
            ));
        }
    }

    for (agent, prefixes) in &config.memory.access {
        if AgentType::from_str(agent).is_err() {
            let known: Vec<String> = AgentType::ALL.iter().map(|a| a.to_string()).collect();
            errors.push(ConfigError::validation(format!(
                "memory.access: unknown agent type `{agent}` (known: {})",
                known.join(", ")
            )));
        }
        if prefixes.iter().any(|p| p.is_empty()) {
            errors.push(ConfigError::validation(format!(
                "memory.access.{agent} contains an empty prefix"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

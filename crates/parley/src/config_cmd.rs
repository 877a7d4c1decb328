// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley config`: print the effective configuration.

use parley_config::ParleyConfig;
use parley_core::ParleyError;

const REDACTED: &str = "[redacted]";

/// Render `config` as TOML with secrets replaced.
pub fn render_config(config: &ParleyConfig) -> Result<String, ParleyError> {
    let mut shown = config.clone();
    if shown.gateway.bearer_token.is_some() {
        shown.gateway.bearer_token = Some(REDACTED.to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| ParleyError::Internal(format!("failed to render config: {e}")))
}

/// Runs the `parley config` command.
pub fn print_config(config: &ParleyConfig) -> Result<(), ParleyError> {
    print!("{}", render_config(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_is_redacted() {
        let mut config = ParleyConfig::default();
        config.gateway.bearer_token = Some("super-secret".into());

        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("[gateway]"));
    }

    #[test]
    fn rendered_config_loads_back() {
        let config = ParleyConfig::default();
        let rendered = render_config(&config).unwrap();
        let reparsed = parley_config::load_config_from_str(&rendered).unwrap();
        assert_eq!(reparsed.gateway.port, config.gateway.port);
        assert_eq!(reparsed.restore.recent_messages, config.restore.recent_messages);
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for Parley.
//!
//! Exposes the conversation, memory, and attachment stores plus the agent
//! restore/persist adapters as a JSON API under `/v1`. The gateway holds no
//! business logic: handlers validate input and delegate.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use parley_config::model::GatewayConfig;
use parley_core::{AdapterType, HealthStatus, ParleyError, PluginAdapter};

pub use error::ApiError;
pub use server::{GatewayState, build_router};

/// The HTTP gateway as a managed adapter.
///
/// [`start`](Gateway::start) binds the listener and runs the axum server as
/// a background task; [`PluginAdapter::shutdown`] stops accepting requests
/// and waits for in-flight ones to finish.
pub struct Gateway {
    config: GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
    server_handle: Mutex<Option<tokio::task::JoinHandle<Result<(), ParleyError>>>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, state: GatewayState) -> Self {
        Self {
            config,
            state,
            cancel: CancellationToken::new(),
            server_handle: Mutex::new(None),
        }
    }

    /// Gateway whose shutdown follows `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bind and start serving. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, ParleyError> {
        let mut handle = self.server_handle.lock().await;
        if handle.is_some() {
            return Err(ParleyError::Internal("gateway already started".into()));
        }

        let listener = server::bind(&self.config.host, self.config.port).await?;
        let addr = listener
            .local_addr()
            .map_err(|e| ParleyError::Internal(format!("gateway listener has no address: {e}")))?;
        let router = build_router(
            self.state.clone(),
            Duration::from_secs(self.config.request_timeout_secs),
        );
        let cancel = self.cancel.clone();
        *handle = Some(tokio::spawn(server::serve(listener, router, cancel)));

        tracing::info!(%addr, "gateway started");
        Ok(addr)
    }

    /// Wait for the server task to end.
    pub async fn wait(&self) -> Result<(), ParleyError> {
        let handle = self.server_handle.lock().await.take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| ParleyError::Internal(format!("gateway task failed: {e}")))?,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PluginAdapter for Gateway {
    fn name(&self) -> &str {
        "gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let running = self
            .server_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        if !running {
            return Ok(HealthStatus::Unhealthy("server not running".to_string()));
        }
        self.state.storage.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.cancel.cancel();
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use parley_config::ParleyConfig;
    use parley_test_utils::temp_storage;

    use super::*;

    fn ephemeral() -> GatewayConfig {
        GatewayConfig {
            port: 0,
            bearer_token: Some("secret-token".into()),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn start_health_and_shutdown() {
        let (storage, _dir) = temp_storage().await;
        let state = GatewayState::new(storage, &ParleyConfig::default()).unwrap();
        let gateway = Gateway::new(ephemeral(), state);
        assert_eq!(gateway.name(), "gateway");
        assert_eq!(gateway.adapter_type(), AdapterType::Gateway);

        assert!(matches!(
            gateway.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));

        let addr = gateway.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(gateway.health_check().await.unwrap(), HealthStatus::Healthy);
        assert!(gateway.start().await.is_err(), "second start should fail");

        gateway.shutdown().await.unwrap();
        assert!(matches!(
            gateway.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use parley_config::ParleyConfig;
use parley_core::{ParleyError, StorageAdapter};
use parley_state::{MemoryPolicy, StatePersister, StateRestorer};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::error::ApiError;
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub storage: Arc<dyn StorageAdapter>,
    pub policy: Arc<MemoryPolicy>,
    pub restorer: StateRestorer,
    pub persister: StatePersister,
    pub auth: AuthConfig,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    /// Wire the state adapters over `storage` as configured.
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        config: &ParleyConfig,
    ) -> Result<Self, ParleyError> {
        let policy = Arc::new(MemoryPolicy::from_config(&config.memory)?);
        Ok(Self {
            restorer: StateRestorer::from_config(storage.clone(), policy.clone(), config),
            persister: StatePersister::from_config(storage.clone(), policy.clone(), config),
            storage,
            policy,
            auth: AuthConfig {
                bearer_token: config.gateway.bearer_token.clone(),
            },
            start_time: Instant::now(),
        })
    }
}

/// Build the full application router.
///
/// - `GET /health` is public
/// - everything under `/v1` requires the bearer token
/// - every request is bounded by `request_timeout`
pub fn build_router(state: GatewayState, request_timeout: Duration) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/v1/conversations",
            post(handlers::create_conversation).get(handlers::list_conversations),
        )
        .route(
            "/v1/conversations/by-entity/{entity_type}/{entity_id}",
            get(handlers::find_by_entity),
        )
        .route("/v1/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/v1/conversations/{id}/participants",
            post(handlers::add_participant),
        )
        .route(
            "/v1/conversations/{id}/messages",
            post(handlers::append_message).get(handlers::list_messages),
        )
        .route(
            "/v1/conversations/{id}/messages/{message_id}/attachments",
            post(handlers::add_attachment),
        )
        .route("/v1/conversations/{id}/memory", get(handlers::list_memory))
        .route(
            "/v1/conversations/{id}/memory/{key}",
            put(handlers::put_memory).get(handlers::get_memory),
        )
        .route("/v1/agents/{agent_type}/restore", post(handlers::restore_state))
        .route("/v1/agents/{agent_type}/persist", post(handlers::persist_state))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(axum_middleware::from_fn_with_state(
            request_timeout,
            timeout_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Answer `504` with a `timeout` error body when a request runs too long.
async fn timeout_middleware(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError(ParleyError::Timeout { duration: limit }).into_response(),
    }
}

/// Bind the gateway listener.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ParleyError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Config(format!("failed to bind gateway to {addr}: {e}")))
}

/// Serve `router` on `listener` until `cancel` fires, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> Result<(), ParleyError> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    tracing::info!(addr = ?addr, "gateway server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("gateway server shutting down");
        })
        .await
        .map_err(|e| ParleyError::Internal(format!("gateway server error: {e}")))
}

#[cfg(test)]
mod tests {
    use parley_test_utils::temp_storage;

    use super::*;

    #[tokio::test]
    async fn state_wires_auth_from_config() {
        let (storage, _dir) = temp_storage().await;
        let mut config = ParleyConfig::default();
        config.gateway.bearer_token = Some("secret-token".into());

        let state = GatewayState::new(storage, &config).unwrap();
        assert_eq!(state.auth.bearer_token.as_deref(), Some("secret-token"));
        let _cloned = state.clone();
    }

    #[tokio::test]
    async fn unknown_agent_in_access_table_fails_state_construction() {
        let (storage, _dir) = temp_storage().await;
        let mut config = ParleyConfig::default();
        config
            .memory
            .access
            .insert("HAL".into(), vec!["hal.".into()]);

        assert!(matches!(
            GatewayState::new(storage, &config),
            Err(ParleyError::Config(_))
        ));
    }

    #[tokio::test]
    async fn slow_request_times_out_with_504() {
        use axum::body::Body;
        use axum::http::StatusCode;
        use tower::ServiceExt;

        let router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(axum_middleware::from_fn_with_state(
                Duration::from_millis(20),
                timeout_middleware,
            ));

        let response = router
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer token authentication for the `/v1` routes.
//!
//! When no token is configured every request is rejected (fail-closed).

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};

/// Authentication configuration for the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected bearer token. `None` rejects everything.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl AuthConfig {
    fn accepts(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = self.bearer_token.as_deref() else {
            return false;
        };
        authorization
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected)
    }
}

/// Middleware that requires `Authorization: Bearer <token>`.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.bearer_token.is_none() {
        tracing::error!("gateway has no bearer token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if auth.accepts(authorization) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_token(token: &str) -> AuthConfig {
        AuthConfig {
            bearer_token: Some(token.to_string()),
        }
    }

    #[test]
    fn matching_bearer_token_is_accepted() {
        assert!(with_token("secret-token").accepts(Some("Bearer secret-token")));
    }

    #[test]
    fn wrong_scheme_or_token_is_rejected() {
        let auth = with_token("secret-token");
        assert!(!auth.accepts(Some("Bearer other")));
        assert!(!auth.accepts(Some("Basic secret-token")));
        assert!(!auth.accepts(Some("secret-token")));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn no_configured_token_rejects_everything() {
        let auth = AuthConfig { bearer_token: None };
        assert!(!auth.accepts(Some("Bearer ")));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let debug_output = format!("{:?}", with_token("secret-token"));
        assert!(!debug_output.contains("secret-token"));
        assert!(debug_output.contains("[redacted]"));
    }
}

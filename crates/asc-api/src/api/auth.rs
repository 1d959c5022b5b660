//! Bearer-token authentication for the admin/sidecar HTTP surface (spec
//! section 6): "authenticated by bearer token unless `ProtectedApi=false`;
//! health endpoint always open."
//!
//! Extract the `Authorization: Bearer` header, decode+validate with
//! `jsonwebtoken`, 401 with a `WWW-Authenticate` header on failure —
//! a single shared secret rather than a JWKS-fetching validator, since
//! the spec names no external identity provider for this surface.

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use asc_config::AuthConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Self {
        Self { config: Arc::new(config) }
    }
}

/// Paths that bypass bearer verification regardless of `ProtectedApi` —
/// the health endpoint stays open even on a protected deployment.
pub fn is_public_path(path: &str) -> bool {
    matches!(path, "/health" | "/health/live" | "/health/ready" | "/metrics" | "/swagger-ui" | "/api-doc/openapi.json")
        || path.starts_with("/swagger-ui/")
}

pub async fn auth_middleware(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    if !state.config.protected_api || is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request.headers().get(header::AUTHORIZATION).and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => token,
        _ => {
            warn!("missing bearer token");
            return unauthorized_response("missing bearer token");
        }
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&state.config.jwt_issuer]);
    validation.set_audience(&[&state.config.jwt_audience]);

    let key = DecodingKey::from_secret(state.config.jwt_secret.as_bytes());
    match decode::<TokenClaims>(token, &key, &validation) {
        Ok(data) => {
            debug!(sub = %data.claims.sub, "bearer token validated");
            next.run(request).await
        }
        Err(e) => {
            warn!(error = %e, "bearer token rejected");
            unauthorized_response(&e.to_string())
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({ "errors": [message] })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

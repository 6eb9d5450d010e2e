//! HTTP transport.
//!
//! Binds the identity resolver and the dispatcher to `POST {mcp_path}`. Every request
//! is authenticated before its body is looked at.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::auth::IdentityResolver;
use crate::error::AuthError;
use crate::protocol::{DispatchOutcome, Dispatcher};
use crate::server::oauth::types::OAuthErrorBody;

/// Header carrying the protocol session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub dispatcher: Dispatcher,
    pub resolver: IdentityResolver,
    /// Protected resource metadata URL advertised in challenges, when OAuth is on.
    pub resource_metadata_url: Option<String>,
    pub service_name: String,
    pub version: String,
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState")
            .field("dispatcher", &self.dispatcher)
            .field("resolver", &self.resolver)
            .field("resource_metadata_url", &self.resource_metadata_url)
            .finish_non_exhaustive()
    }
}

/// Router for the MCP endpoint and `/health`.
pub fn create_router(state: Arc<HttpState>, mcp_path: &str) -> Router {
    let mcp = Router::new()
        .route(mcp_path, post(handle_mcp_post))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    Router::new().route("/health", get(health_check)).with_state(state).merge(mcp)
}

async fn health_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let tools = state.dispatcher.tools().list_tools().await.map_or(0, |t| t.len());
    Json(serde_json::json!({
        "status": "ok",
        "service": state.service_name,
        "version": state.version,
        "tools": tools
    }))
}

/// Handle `POST {mcp_path}`.
async fn handle_mcp_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = match state.resolver.authenticate(&headers).await {
        Ok(identity) => Arc::new(identity),
        Err(error) => {
            let rejection = AuthRejection {
                error,
                resource_metadata: state.resource_metadata_url.clone(),
            };
            return rejection.into_response();
        }
    };

    let session_id = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    let result = state.dispatcher.dispatch(&body, session_id, Some(identity)).await;

    let mut response = match result.outcome {
        DispatchOutcome::Single(response) => Json(response).into_response(),
        DispatchOutcome::Batch(responses) => Json(responses).into_response(),
        DispatchOutcome::NoContent => StatusCode::ACCEPTED.into_response(),
    };

    if let Some(id) = result.session_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        response.headers_mut().insert(SESSION_HEADER, id);
    }
    response
}

/// Authentication failure rendered as an HTTP response.
///
/// 401s carry a `WWW-Authenticate` challenge pointing at the protected resource
/// metadata so clients can discover the authorization server.
#[derive(Debug)]
pub struct AuthRejection {
    pub error: AuthError,
    pub resource_metadata: Option<String>,
}

impl AuthRejection {
    fn challenge(&self) -> Option<String> {
        let mut params = Vec::new();
        match &self.error {
            AuthError::MissingCredential => {}
            AuthError::InvalidCredential { .. } => {
                params.push(r#"error="invalid_token""#.to_string());
            }
            AuthError::UpstreamUnavailable(_) => return None,
        }
        if let Some(url) = &self.resource_metadata {
            params.push(format!(r#"resource_metadata="{url}""#));
        }

        if params.is_empty() {
            Some("Bearer".to_string())
        } else {
            Some(format!("Bearer {}", params.join(", ")))
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let description = match &self.error {
            AuthError::MissingCredential => "Authentication required",
            AuthError::InvalidCredential { .. } => "Invalid or expired credential",
            AuthError::UpstreamUnavailable(_) => "Identity provider unavailable",
        };
        let body = OAuthErrorBody {
            error: self.error.oauth_error_code().to_string(),
            error_description: Some(description.to_string()),
        };

        let mut response = (self.error.status_code(), Json(body)).into_response();
        if let Some(value) = self.challenge().and_then(|c| HeaderValue::from_str(&c).ok()) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

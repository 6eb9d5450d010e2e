//! OAuth gateway endpoint handlers.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration (answered with the shared client)
//! - authorize/token/userinfo proxies to the upstream identity provider

use axum::{
    Json,
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use super::OAuthGateway;
use super::types::{
    AuthorizationServerMetadata, OAuthErrorBody, ProtectedResourceMetadata, RegistrationRequest,
    RegistrationResponse,
};
use crate::error::{GatewayError, UpstreamError};

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let description = match &self {
            Self::MissingBearer => None,
            other => Some(other.to_string()),
        };
        let body = OAuthErrorBody {
            error: self.oauth_error_code().to_string(),
            error_description: description,
        };
        (
            self.status_code(),
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))],
            Json(body),
        )
            .into_response()
    }
}

// ─── Discovery ───────────────────────────────────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
pub async fn handle_auth_server_metadata(State(gateway): State<OAuthGateway>) -> impl IntoResponse {
    tracing::debug!("Authorization server metadata requested");
    Json(AuthorizationServerMetadata::new(gateway.config()))
}

/// `GET /.well-known/oauth-protected-resource`
pub async fn handle_protected_resource(State(gateway): State<OAuthGateway>) -> impl IntoResponse {
    Json(ProtectedResourceMetadata::new(gateway.config(), gateway.mcp_path()))
}

// ─── Authorization ───────────────────────────────────────────────────────────

/// `GET /oauth/authorize`
///
/// Redirects (302) to the upstream authorization endpoint with the query string untouched.
pub async fn handle_authorize(
    State(gateway): State<OAuthGateway>,
    RawQuery(query): RawQuery,
) -> Response {
    let upstream = gateway.config().upstream_authorization_endpoint();
    let location = match query.as_deref() {
        Some(q) if !q.is_empty() => format!("{upstream}?{q}"),
        _ => upstream,
    };

    tracing::debug!(location = %location, "Redirecting authorization request upstream");
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

// ─── Token ───────────────────────────────────────────────────────────────────

/// `POST /oauth/token`
///
/// Forwards the form body to the upstream token endpoint once (authorization codes are
/// single-use, so no retries) and relays the answer unchanged.
pub async fn handle_token(State(gateway): State<OAuthGateway>, body: Bytes) -> Response {
    let url = gateway.config().upstream_token_endpoint();
    let result = gateway
        .client()
        .post(&url)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .timeout(gateway.timeout())
        .body(body)
        .send()
        .await;

    let response = match relay(result, &gateway).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Token request failed");
            return GatewayError::from(e).into_response();
        }
    };

    if response.status() != StatusCode::OK {
        tracing::warn!(status = %response.status(), "Upstream token endpoint returned error");
    }

    with_token_headers(response)
}

fn with_token_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

/// `POST /oauth/register`
///
/// Every client gets the same pre-provisioned public client.
pub async fn handle_register(State(gateway): State<OAuthGateway>, body: Bytes) -> Response {
    let request = match parse_registration(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::info!(error = %e, "Rejected client registration");
            return e.into_response();
        }
    };

    let response = RegistrationResponse::shared_client(gateway.config(), request);
    tracing::info!(
        client_name = %response.client_name,
        redirect_uris = ?response.redirect_uris,
        "Registered client"
    );

    (
        StatusCode::CREATED,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        Json(response),
    )
        .into_response()
}

fn parse_registration(body: &[u8]) -> Result<RegistrationRequest, GatewayError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidClientMetadata(e.to_string()))?;
    if !value.is_object() {
        return Err(GatewayError::InvalidClientMetadata("body must be a JSON object".into()));
    }
    serde_json::from_value(value).map_err(|e| GatewayError::InvalidClientMetadata(e.to_string()))
}

// ─── UserInfo ────────────────────────────────────────────────────────────────

/// `GET /oauth/userinfo`
///
/// Requires a bearer token; without one the upstream is never contacted. The caller's
/// `Authorization` header is forwarded as received.
pub async fn handle_userinfo(
    State(gateway): State<OAuthGateway>,
    headers: HeaderMap,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
) -> Response {
    let (Ok(_), Some(authorization)) = (auth, headers.get(header::AUTHORIZATION).cloned()) else {
        return GatewayError::MissingBearer.into_response();
    };

    let result = gateway
        .client()
        .get(gateway.config().upstream_userinfo_endpoint())
        .header(header::AUTHORIZATION, authorization)
        .timeout(gateway.timeout())
        .send()
        .await;

    match relay(result, &gateway).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "UserInfo request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(OAuthErrorBody {
                    error: "server_error".into(),
                    error_description: None,
                }),
            )
                .into_response()
        }
    }
}

// ─── CORS preflight ──────────────────────────────────────────────────────────

/// `OPTIONS /oauth/*`
pub async fn handle_options() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
        ],
    )
}

/// Turn an upstream reply into a response with the same status and body bytes.
async fn relay(
    result: Result<reqwest::Response, reqwest::Error>,
    gateway: &OAuthGateway,
) -> Result<Response, UpstreamError> {
    let upstream = result.map_err(|e| UpstreamError::from_reqwest(&e, gateway.timeout()))?;

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));

    let body = upstream
        .bytes()
        .await
        .map_err(|e| UpstreamError::from_reqwest(&e, gateway.timeout()))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    Ok((status, headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registration() {
        let request =
            parse_registration(br#"{"client_name":"X","redirect_uris":["https://a/cb"]}"#).unwrap();
        assert_eq!(request.client_name, Some(serde_json::json!("X")));
        assert_eq!(request.redirect_uris, Some(serde_json::json!(["https://a/cb"])));

        let request = parse_registration(br#"{"client_name":42,"redirect_uris":"https://a/cb"}"#)
            .unwrap();
        assert_eq!(request.client_name, Some(serde_json::json!(42)));
        assert_eq!(request.redirect_uris, Some(serde_json::json!("https://a/cb")));

        assert!(parse_registration(b"{}").unwrap().client_name.is_none());
        assert!(matches!(
            parse_registration(b"not json"),
            Err(GatewayError::InvalidClientMetadata(_))
        ));
        assert!(matches!(parse_registration(b"[]"), Err(GatewayError::InvalidClientMetadata(_))));
    }

    #[test]
    fn test_gateway_error_response() {
        let response = GatewayError::MissingBearer.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

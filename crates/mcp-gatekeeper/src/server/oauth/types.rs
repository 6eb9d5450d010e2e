//! OAuth discovery and registration documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::OAuthRouterConfig;

/// RFC 8414 authorization server metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub resource_parameter_supported: bool,
    pub service_documentation: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl AuthorizationServerMetadata {
    /// Metadata pointing clients at this service's proxy endpoints and the upstream keys.
    #[must_use]
    pub fn new(config: &OAuthRouterConfig) -> Self {
        Self {
            issuer: config.issuer(),
            authorization_endpoint: config.public_url("/oauth/authorize"),
            token_endpoint: config.public_url("/oauth/token"),
            registration_endpoint: config.public_url("/oauth/register"),
            userinfo_endpoint: config.public_url("/oauth/userinfo"),
            jwks_uri: config.jwks_uri(),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&["authorization_code", "refresh_token"]),
            code_challenge_methods_supported: strings(&["S256"]),
            token_endpoint_auth_methods_supported: strings(&["none"]),
            scopes_supported: strings(&["openid", "profile", "email", "offline_access"]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&["RS256"]),
            claims_supported: strings(&[
                "sub",
                "iss",
                "aud",
                "exp",
                "iat",
                "email",
                "email_verified",
                "name",
                "preferred_username",
            ]),
            resource_parameter_supported: true,
            service_documentation: config.public_url("/docs"),
        }
    }
}

/// RFC 9728 protected resource metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
    pub resource_name: String,
    pub resource_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub resource_documentation: String,
}

impl ProtectedResourceMetadata {
    /// Metadata for the MCP endpoint at `mcp_path`.
    #[must_use]
    pub fn new(config: &OAuthRouterConfig, mcp_path: &str) -> Self {
        Self {
            resource: config.public_url(mcp_path),
            authorization_servers: vec![config.resource_url.clone()],
            bearer_methods_supported: strings(&["header"]),
            resource_name: config.service_name.clone(),
            resource_signing_alg_values_supported: strings(&["RS256"]),
            scopes_supported: strings(&["openid", "profile", "email"]),
            resource_documentation: config.public_url("/docs"),
        }
    }
}

/// RFC 7591 registration request. Unknown fields are ignored and the echoed
/// fields are taken as sent, whatever their JSON type.
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub client_name: Option<Value>,
    #[serde(default)]
    pub redirect_uris: Option<Value>,
}

/// Registration response: always the shared public client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: Value,
    pub redirect_uris: Value,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub application_type: String,
}

impl RegistrationResponse {
    /// Default `client_name` when the request omits one.
    pub const DEFAULT_CLIENT_NAME: &'static str = "MCP Client";

    /// Answer `request` with the shared client.
    #[must_use]
    pub fn shared_client(config: &OAuthRouterConfig, request: RegistrationRequest) -> Self {
        Self {
            client_id: config.shared_client_id.clone(),
            client_secret: String::new(),
            client_name: request
                .client_name
                .unwrap_or_else(|| Value::from(Self::DEFAULT_CLIENT_NAME)),
            redirect_uris: request
                .redirect_uris
                .unwrap_or_else(|| Value::Array(Vec::new())),
            grant_types: strings(&["authorization_code", "refresh_token"]),
            response_types: strings(&["code"]),
            token_endpoint_auth_method: "none".to_string(),
            application_type: "web".to_string(),
        }
    }
}

/// OAuth error body (`error`, `error_description`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

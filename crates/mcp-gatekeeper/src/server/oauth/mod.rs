//! OAuth gateway for MCP authentication.
//!
//! Stateless discovery and proxy layer in front of an upstream OpenID-Connect
//! provider. Nothing is stored here: clients register as one shared public client
//! and every token flow is relayed upstream.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256), enforced upstream

pub mod handlers;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};

use crate::config::{Config, OAuthRouterConfig};

pub use types::{AuthorizationServerMetadata, ProtectedResourceMetadata, RegistrationResponse};

/// Path of the protected resource metadata document.
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// Path of the authorization server metadata document.
pub const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";

/// Shared, read-only gateway state.
#[derive(Clone)]
pub struct OAuthGateway {
    config: Arc<OAuthRouterConfig>,
    client: reqwest::Client,
    timeout: Duration,
    mcp_path: Arc<str>,
}

impl OAuthGateway {
    /// Create a gateway using `client` for upstream calls.
    #[must_use]
    pub fn new(
        config: OAuthRouterConfig,
        client: reqwest::Client,
        timeout: Duration,
        mcp_path: &str,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            timeout,
            mcp_path: Arc::from(mcp_path),
        }
    }

    /// Create a gateway from server configuration. `Ok(None)` when OAuth is off.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn from_config(config: &Config) -> Result<Option<Self>, reqwest::Error> {
        let Some(oauth) = &config.oauth else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Some(Self::new(oauth.clone(), client, config.upstream_timeout, &config.mcp_path)))
    }

    /// Gateway configuration.
    #[must_use]
    pub fn config(&self) -> &OAuthRouterConfig {
        &self.config
    }

    /// Public URL of the protected resource metadata document.
    #[must_use]
    pub fn resource_metadata_url(&self) -> String {
        self.config.public_url(PROTECTED_RESOURCE_PATH)
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn mcp_path(&self) -> &str {
        &self.mcp_path
    }

    /// Router serving the discovery documents and the `/oauth/*` endpoints.
    pub fn router(self) -> Router {
        Router::new()
            .route(AUTHORIZATION_SERVER_PATH, get(handlers::handle_auth_server_metadata))
            .route(PROTECTED_RESOURCE_PATH, get(handlers::handle_protected_resource))
            .route(
                "/oauth/authorize",
                get(handlers::handle_authorize).options(handlers::handle_options),
            )
            .route(
                "/oauth/token",
                axum::routing::post(handlers::handle_token).options(handlers::handle_options),
            )
            .route(
                "/oauth/register",
                axum::routing::post(handlers::handle_register).options(handlers::handle_options),
            )
            .route(
                "/oauth/userinfo",
                get(handlers::handle_userinfo).options(handlers::handle_options),
            )
            .with_state(self)
    }
}

impl std::fmt::Debug for OAuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthGateway")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .field("mcp_path", &self.mcp_path)
            .finish()
    }
}

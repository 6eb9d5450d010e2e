//! MCP server assembly.
//!
//! [`McpServer`] wires configuration, the tool registry and the optional PAT verifier
//! into one axum [`Router`]:
//!
//! - `POST {mcp_path}`: authenticated JSON-RPC endpoint
//! - `/.well-known/*` and `/oauth/*`: OAuth gateway (when OAuth is configured)
//! - `GET /health`

pub mod oauth;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{IdentityResolver, JwksCache, JwtSettings, PatVerifier};
use crate::config::Config;
use crate::protocol::{Dispatcher, SessionStore};
use crate::tools::ToolRegistry;

use self::oauth::OAuthGateway;
use self::transport::HttpState;

/// MCP server builder.
pub struct McpServer {
    config: Config,
    tools: Arc<dyn ToolRegistry>,
    pat_verifier: Option<Arc<dyn PatVerifier>>,
    jwks: Option<Arc<JwksCache>>,
}

impl McpServer {
    /// Create a server exposing `tools`.
    #[must_use]
    pub fn new(config: Config, tools: impl ToolRegistry + 'static) -> Self {
        Self::with_registry(config, Arc::new(tools))
    }

    /// Create a server around a shared registry.
    #[must_use]
    pub fn with_registry(config: Config, tools: Arc<dyn ToolRegistry>) -> Self {
        Self {
            config,
            tools,
            pat_verifier: None,
            jwks: None,
        }
    }

    /// Set the PAT verification callback. Required when PAT settings are configured.
    #[must_use]
    pub fn with_pat_verifier(mut self, verifier: impl PatVerifier + 'static) -> Self {
        self.pat_verifier = Some(Arc::new(verifier));
        self
    }

    /// Use an existing JWKS cache instead of creating one.
    #[must_use]
    pub fn with_jwks_cache(mut self, cache: Arc<JwksCache>) -> Self {
        self.jwks = Some(cache);
        self
    }

    /// Server configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Build the identity resolver for the configured authentication modes.
    ///
    /// # Errors
    ///
    /// Returns error if PAT settings lack a verifier or the HTTP client cannot be built.
    pub fn identity_resolver(&self) -> anyhow::Result<IdentityResolver> {
        let mut resolver = IdentityResolver::new();

        match (&self.config.pat, &self.pat_verifier) {
            (Some(settings), Some(verifier)) => {
                resolver = resolver.with_pat(settings.clone(), Arc::clone(verifier));
            }
            (Some(_), None) => anyhow::bail!("PAT settings configured without a PAT verifier"),
            (None, Some(_)) => tracing::warn!("PAT verifier supplied but PAT settings are missing"),
            (None, None) => {}
        }

        if let Some(settings) = JwtSettings::from_config(&self.config) {
            let cache = match &self.jwks {
                Some(cache) => Arc::clone(cache),
                None => Arc::new(JwksCache::new(&self.config)?),
            };
            resolver = resolver.with_jwt(settings, cache);
        }

        if !resolver.has_pat() && !resolver.has_jwt() {
            tracing::warn!("No authentication mode configured; every MCP request will be rejected");
        }

        Ok(resolver)
    }

    /// Build the HTTP router.
    ///
    /// # Errors
    ///
    /// Returns error on invalid authentication setup or HTTP client failure.
    pub fn router(&self) -> anyhow::Result<Router> {
        let resolver = self.identity_resolver()?;
        let gateway = OAuthGateway::from_config(&self.config)?;

        let dispatcher = Dispatcher::new(
            &self.config,
            Arc::clone(&self.tools),
            SessionStore::from_config(&self.config),
        );

        let state = Arc::new(HttpState {
            dispatcher,
            resolver,
            resource_metadata_url: gateway.as_ref().map(OAuthGateway::resource_metadata_url),
            service_name: self.config.server_name.clone(),
            version: self.config.server_version.clone(),
        });

        let mut router = transport::create_router(state, &self.config.mcp_path);
        if let Some(gateway) = gateway {
            tracing::info!(
                issuer = %gateway.config().issuer(),
                resource = %gateway.config().resource_url,
                "OAuth gateway enabled"
            );
            router = router.merge(gateway.router());
        }

        Ok(router.layer(TraceLayer::new_for_http()))
    }

    /// Run the server in HTTP mode until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error on server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        tracing::info!("Starting MCP server in HTTP mode on port {}", port);

        let router = self.router()?;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("config", &self.config)
            .field("pat_verifier", &self.pat_verifier.is_some())
            .finish_non_exhaustive()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}

//! Configuration for the MCP gatekeeper.
//!
//! Everything here is built once at process start and shared read-only afterwards.

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Default values.
pub mod defaults {
    use std::time::Duration;

    /// Path of the JSON-RPC endpoint.
    pub const MCP_PATH: &str = "/mcp";

    /// Timeout for every upstream identity-provider call.
    pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout for upstream calls.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// How long a fetched JWKS stays fresh (1 hour).
    pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

    /// Minimum age of a cached JWKS before an unknown `kid` may force a refetch.
    pub const JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

    /// Retries for JWKS fetches (idempotent GET only).
    pub const JWKS_MAX_RETRIES: u32 = 2;

    /// Allowed clock skew when checking `exp`/`nbf`, in seconds.
    pub const CLOCK_LEEWAY_SECS: u64 = 60;

    /// Sessions expire after this much inactivity.
    pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

    /// Maximum number of live sessions.
    pub const SESSION_MAX_CAPACITY: u64 = 10_000;

    /// Maximum number of messages in one JSON-RPC batch.
    pub const MAX_BATCH_SIZE: usize = 100;

    /// PAT header name.
    pub const PAT_HEADER: &str = "X-API-Key";

    /// Human-readable service name.
    pub const SERVICE_NAME: &str = "MCP Service";
}

/// Upstream identity provider and public URLs used by the OAuth gateway.
///
/// The upstream follows the OpenID-Connect realm layout
/// `{upstream_issuer_url}/realms/{upstream_realm}/protocol/openid-connect/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRouterConfig {
    /// Public base URL of this service (e.g. `https://tools.example.com`).
    pub resource_url: String,

    /// Base URL of the identity provider (e.g. `https://auth.example.com`).
    pub upstream_issuer_url: String,

    /// Realm (tenant) on the identity provider.
    pub upstream_realm: String,

    /// Pre-provisioned public client handed out by dynamic registration.
    pub shared_client_id: String,

    /// Display name of this service.
    pub service_name: String,
}

impl OAuthRouterConfig {
    /// Create and validate an OAuth configuration.
    ///
    /// Trailing slashes are stripped from both URLs.
    pub fn new(
        resource_url: impl Into<String>,
        upstream_issuer_url: impl Into<String>,
        upstream_realm: impl Into<String>,
        shared_client_id: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let resource_url = resource_url.into().trim_end_matches('/').to_string();
        let upstream_issuer_url = upstream_issuer_url.into().trim_end_matches('/').to_string();
        let upstream_realm = upstream_realm.into();
        let shared_client_id = shared_client_id.into();

        Url::parse(&resource_url).map_err(|source| ConfigError::InvalidUrl {
            field: "resource_url",
            source,
        })?;
        Url::parse(&upstream_issuer_url).map_err(|source| ConfigError::InvalidUrl {
            field: "upstream_issuer_url",
            source,
        })?;

        if upstream_realm.is_empty() {
            return Err(ConfigError::Missing("upstream_realm"));
        }
        if shared_client_id.is_empty() {
            return Err(ConfigError::Missing("shared_client_id"));
        }

        Ok(Self {
            resource_url,
            upstream_issuer_url,
            upstream_realm,
            shared_client_id,
            service_name: service_name.into(),
        })
    }

    /// Realm base URL; this is the `iss` claim of tokens issued upstream.
    #[must_use]
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.upstream_issuer_url, self.upstream_realm)
    }

    fn oidc_endpoint(&self, name: &str) -> String {
        format!("{}/protocol/openid-connect/{name}", self.issuer())
    }

    /// Upstream authorization endpoint.
    #[must_use]
    pub fn upstream_authorization_endpoint(&self) -> String {
        self.oidc_endpoint("auth")
    }

    /// Upstream token endpoint.
    #[must_use]
    pub fn upstream_token_endpoint(&self) -> String {
        self.oidc_endpoint("token")
    }

    /// Upstream userinfo endpoint.
    #[must_use]
    pub fn upstream_userinfo_endpoint(&self) -> String {
        self.oidc_endpoint("userinfo")
    }

    /// Upstream JWKS endpoint.
    #[must_use]
    pub fn jwks_uri(&self) -> String {
        self.oidc_endpoint("certs")
    }

    /// Public URL of a path on this service.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!("{}{path}", self.resource_url)
    }
}

/// Personal access token header settings. The verifier itself is supplied in code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatSettings {
    /// Header carrying the token (e.g. `X-API-Key`).
    pub header_name: String,

    /// Required value prefix; stripped before verification.
    pub prefix: String,
}

impl PatSettings {
    /// Create PAT settings.
    #[must_use]
    pub fn new(header_name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
            prefix: prefix.into(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name reported in `serverInfo`.
    pub server_name: String,

    /// Version reported in `serverInfo`.
    pub server_version: String,

    /// Optional `instructions` returned from `initialize`.
    pub instructions: Option<String>,

    /// Path of the JSON-RPC endpoint.
    pub mcp_path: String,

    /// OAuth gateway and bearer validation settings. `None` disables both.
    pub oauth: Option<OAuthRouterConfig>,

    /// PAT header settings. `None` disables PAT authentication.
    pub pat: Option<PatSettings>,

    /// Expected `aud` claim. `None` skips audience validation.
    pub audience: Option<String>,

    /// Timeout for upstream calls.
    pub upstream_timeout: Duration,

    /// Connection timeout for upstream calls.
    pub connect_timeout: Duration,

    /// JWKS freshness.
    pub jwks_cache_ttl: Duration,

    /// Minimum JWKS age before an unknown `kid` forces a refetch.
    pub jwks_min_refresh_interval: Duration,

    /// Retries for JWKS fetches.
    pub jwks_max_retries: u32,

    /// Allowed clock skew, in seconds.
    pub clock_leeway_secs: u64,

    /// Session idle expiry.
    pub session_idle_timeout: Duration,

    /// Maximum live sessions.
    pub session_max_capacity: u64,

    /// Maximum messages per batch.
    pub max_batch_size: usize,
}

impl Config {
    /// Create a configuration with defaults and no authentication modes enabled.
    #[must_use]
    pub fn new(server_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            server_version: server_version.into(),
            instructions: None,
            mcp_path: defaults::MCP_PATH.to_string(),
            oauth: None,
            pat: None,
            audience: None,
            upstream_timeout: defaults::UPSTREAM_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            jwks_cache_ttl: defaults::JWKS_CACHE_TTL,
            jwks_min_refresh_interval: defaults::JWKS_MIN_REFRESH_INTERVAL,
            jwks_max_retries: defaults::JWKS_MAX_RETRIES,
            clock_leeway_secs: defaults::CLOCK_LEEWAY_SECS,
            session_idle_timeout: defaults::SESSION_IDLE_TIMEOUT,
            session_max_capacity: defaults::SESSION_MAX_CAPACITY,
            max_batch_size: defaults::MAX_BATCH_SIZE,
        }
    }

    /// Enable the OAuth gateway and bearer validation.
    #[must_use]
    pub fn with_oauth(mut self, oauth: OAuthRouterConfig) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Enable PAT authentication.
    #[must_use]
    pub fn with_pat(mut self, pat: PatSettings) -> Self {
        self.pat = Some(pat);
        self
    }

    /// Require this `aud` claim on bearer tokens.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the `instructions` returned from `initialize`.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Create a test configuration whose identity provider lives at `upstream_base`
    /// (usually a mock server). Both auth modes are enabled, retries are off and
    /// timeouts are short.
    #[must_use]
    pub fn for_testing(upstream_base: &str) -> Self {
        let oauth = OAuthRouterConfig {
            resource_url: "https://mcp.example.com".to_string(),
            upstream_issuer_url: upstream_base.trim_end_matches('/').to_string(),
            upstream_realm: "test".to_string(),
            shared_client_id: "test-client".to_string(),
            service_name: "Test Service".to_string(),
        };

        Self {
            upstream_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            jwks_cache_ttl: Duration::from_secs(300),
            jwks_min_refresh_interval: Duration::ZERO,
            jwks_max_retries: 0,
            ..Self::new("test-server", "0.0.0")
        }
        .with_oauth(oauth)
        .with_pat(PatSettings::new(defaults::PAT_HEADER, "test_pat_"))
    }

    /// Create configuration from environment variables.
    ///
    /// OAuth is enabled when `MCP_RESOURCE_URL`, `OIDC_ISSUER_URL`, `OIDC_REALM` and
    /// `OIDC_CLIENT_ID` are all set. PAT is enabled when `MCP_PAT_PREFIX` is set.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from variables resolved by `lookup`, with the same names
    /// and rules as [`Config::from_env`]. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns error if a URL or number does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let mut config = Self::new(
            var("MCP_SERVER_NAME").unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            env!("CARGO_PKG_VERSION"),
        );

        if let (Some(resource), Some(issuer), Some(realm), Some(client)) = (
            var("MCP_RESOURCE_URL"),
            var("OIDC_ISSUER_URL"),
            var("OIDC_REALM"),
            var("OIDC_CLIENT_ID"),
        ) {
            let service =
                var("MCP_SERVICE_NAME").unwrap_or_else(|| defaults::SERVICE_NAME.to_string());
            config = config.with_oauth(OAuthRouterConfig::new(
                resource, issuer, realm, client, service,
            )?);
        }

        if let Some(prefix) = var("MCP_PAT_PREFIX") {
            let header = var("MCP_PAT_HEADER").unwrap_or_else(|| defaults::PAT_HEADER.to_string());
            config = config.with_pat(PatSettings::new(header, prefix));
        }

        if let Some(audience) = var("OIDC_AUDIENCE") {
            config = config.with_audience(audience);
        }

        if let Some(secs) = var("MCP_UPSTREAM_TIMEOUT_SECS") {
            config.upstream_timeout = Duration::from_secs(secs.parse()?);
        }

        Ok(config)
    }

    /// Check if bearer-token authentication is configured.
    #[must_use]
    pub const fn has_oauth(&self) -> bool {
        self.oauth.is_some()
    }

    /// Check if PAT authentication is configured.
    #[must_use]
    pub const fn has_pat(&self) -> bool {
        self.pat.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

//! Identity resolver: headers in, [`Identity`] or [`AuthError`] out.

use std::sync::Arc;

use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use super::jwks::JwksCache;
use super::pat::PatVerifier;
use super::{AuthMode, Credential, Identity};
use crate::config::{Config, PatSettings};
use crate::error::{AuthError, AuthResult};

/// Signature algorithms accepted on bearer tokens. Symmetric and `none` are refused.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Bearer-token validation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtSettings {
    /// Expected `iss` claim; also the JWKS cache key.
    pub issuer: String,
    /// Where the issuer publishes its keys.
    pub jwks_uri: String,
    /// Expected `aud` claim. `None` skips the audience check.
    pub audience: Option<String>,
    /// Clock skew tolerance in seconds.
    pub leeway_secs: u64,
}

impl JwtSettings {
    /// Derive settings from the server configuration. `None` when OAuth is off.
    #[must_use]
    pub fn from_config(config: &Config) -> Option<Self> {
        config.oauth.as_ref().map(|oauth| Self {
            issuer: oauth.issuer(),
            jwks_uri: oauth.jwks_uri(),
            audience: config.audience.clone(),
            leeway_secs: config.clock_leeway_secs,
        })
    }
}

/// Claims read from a verified access token.
#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

struct PatAuth {
    settings: PatSettings,
    verifier: Arc<dyn PatVerifier>,
}

struct JwtAuth {
    settings: JwtSettings,
    cache: Arc<JwksCache>,
}

/// Resolves the caller of each request.
///
/// Holds no per-request state; one instance is shared by all requests.
#[derive(Default)]
pub struct IdentityResolver {
    pat: Option<PatAuth>,
    jwt: Option<JwtAuth>,
}

impl IdentityResolver {
    /// Create a resolver with no authentication modes; every request fails with
    /// `MissingCredential` until a mode is added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable PAT authentication.
    #[must_use]
    pub fn with_pat(mut self, settings: PatSettings, verifier: Arc<dyn PatVerifier>) -> Self {
        self.pat = Some(PatAuth { settings, verifier });
        self
    }

    /// Enable bearer-token authentication.
    #[must_use]
    pub fn with_jwt(mut self, settings: JwtSettings, cache: Arc<JwksCache>) -> Self {
        self.jwt = Some(JwtAuth { settings, cache });
        self
    }

    /// Returns true if PAT authentication is enabled.
    #[must_use]
    pub const fn has_pat(&self) -> bool {
        self.pat.is_some()
    }

    /// Returns true if bearer-token authentication is enabled.
    #[must_use]
    pub const fn has_jwt(&self) -> bool {
        self.jwt.is_some()
    }

    /// Authenticate a request from its headers.
    ///
    /// Precedence: the PAT header (when present and prefix-matched) is tried first and
    /// is final, a rejected PAT never falls back to the bearer token. Otherwise
    /// `Authorization: Bearer` is verified. With neither, `MissingCredential`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthResult<Identity> {
        let pat_settings = self.pat.as_ref().map(|p| &p.settings);
        let credential =
            Credential::from_headers(headers, pat_settings).ok_or(AuthError::MissingCredential)?;

        let result = match &credential {
            Credential::PresharedToken(token) => self.verify_pat(token).await,
            Credential::BearerToken(token) => self.verify_bearer(token).await,
        };

        match &result {
            Ok(identity) => tracing::debug!(
                subject = %identity.subject_id(),
                mode = ?identity.auth_mode(),
                credential = %credential.fingerprint(),
                "Authenticated request"
            ),
            Err(AuthError::UpstreamUnavailable(e)) => tracing::warn!(
                error = %e,
                "Identity provider unavailable during authentication"
            ),
            Err(e) => tracing::info!(
                error = %e,
                credential = %credential.fingerprint(),
                "Authentication failed"
            ),
        }

        result
    }

    async fn verify_pat(&self, token: &str) -> AuthResult<Identity> {
        let Some(pat) = &self.pat else {
            return Err(AuthError::invalid("PAT authentication not enabled"));
        };
        if token.is_empty() {
            return Err(AuthError::invalid("empty token"));
        }

        let user = pat
            .verifier
            .verify(token)
            .await
            .ok_or_else(|| AuthError::invalid("token rejected by verifier"))?;

        if user.user_id.trim().is_empty() {
            return Err(AuthError::invalid("verifier returned an empty user id"));
        }

        Ok(Identity::new(user.user_id, AuthMode::Pat, format!("{}{token}", pat.settings.prefix))
            .with_email(user.email)
            .with_username(user.username)
            .with_display_name(user.name))
    }

    async fn verify_bearer(&self, token: &str) -> AuthResult<Identity> {
        let Some(jwt) = &self.jwt else {
            return Err(AuthError::invalid("bearer authentication not enabled"));
        };
        let settings = &jwt.settings;

        let header =
            decode_header(token).map_err(|e| AuthError::invalid(format!("malformed token: {e}")))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::invalid(format!("algorithm {:?} not accepted", header.alg)));
        }

        let jwk = jwt
            .cache
            .signing_key(&settings.issuer, &settings.jwks_uri, header.kid.as_deref())
            .await?
            .ok_or_else(|| AuthError::invalid("no matching signing key"))?;

        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| AuthError::invalid(format!("unusable signing key: {e}")))?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = settings.leeway_secs;
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<AccessClaims>(token, &key, &validation)
            .map_err(|e| AuthError::invalid(e.to_string()))?
            .claims;

        if claims.sub.is_empty() {
            return Err(AuthError::invalid("empty subject"));
        }

        Ok(Identity::new(claims.sub, AuthMode::OAuth, token)
            .with_email(claims.email)
            .with_username(claims.preferred_username)
            .with_display_name(claims.name))
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("pat", &self.pat.as_ref().map(|p| &p.settings))
            .field("jwt", &self.jwt.as_ref().map(|j| &j.settings))
            .finish()
    }
}

//! Request-time identity resolution.
//!
//! Two credential kinds are accepted:
//! - a personal access token in a configurable header, checked by an application callback
//! - an OAuth bearer token, verified against the identity provider's JWKS

pub mod jwks;
pub mod pat;
mod resolver;

use std::fmt;

use axum::http::{HeaderMap, header};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::PatSettings;

pub use jwks::{JwksCache, JwksEntry};
pub use pat::{PatVerifier, UserInfo};
pub use resolver::{IdentityResolver, JwtSettings};

/// How a request was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthMode {
    /// Bearer token issued by the upstream identity provider.
    #[serde(rename = "oauth")]
    OAuth,
    /// Personal access token verified by the application.
    #[serde(rename = "pat")]
    Pat,
}

/// A credential extracted from request headers.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Authorization: Bearer <token>`.
    BearerToken(String),
    /// PAT header value with the configured prefix removed.
    PresharedToken(String),
}

impl Credential {
    /// Pick the credential for this request.
    ///
    /// The PAT header wins when present and prefix-matched; otherwise the bearer token
    /// is used. A PAT header without the prefix is ignored.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, pat: Option<&PatSettings>) -> Option<Self> {
        if let Some(settings) = pat {
            let token = headers
                .get(settings.header_name.as_str())
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix(settings.prefix.as_str()));
            if let Some(token) = token {
                return Some(Self::PresharedToken(token.to_owned()));
            }
        }

        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(|token| Self::BearerToken(token.to_owned()))
    }

    /// The secret itself.
    #[must_use]
    pub fn secret(&self) -> &str {
        match self {
            Self::BearerToken(t) | Self::PresharedToken(t) => t,
        }
    }

    /// Short, non-reversible identifier for log lines.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(self.secret())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BearerToken(_) => write!(f, "BearerToken({})", self.fingerprint()),
            Self::PresharedToken(_) => write!(f, "PresharedToken({})", self.fingerprint()),
        }
    }
}

/// Extract the token from an `Authorization` header value (`Bearer` scheme, any case).
#[must_use]
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// First 8 bytes of the SHA-256 of `secret`, hex encoded.
#[must_use]
pub fn fingerprint(secret: &str) -> String {
    Sha256::digest(secret.as_bytes())
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// A verified caller. Created once per request by [`IdentityResolver`], never persisted.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    subject_id: String,
    email: Option<String>,
    username: Option<String>,
    display_name: Option<String>,
    auth_mode: AuthMode,
    #[serde(skip)]
    raw_credential: String,
}

impl Identity {
    /// Create an identity for `subject_id`.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        auth_mode: AuthMode,
        raw_credential: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: None,
            username: None,
            display_name: None,
            auth_mode,
            raw_credential: raw_credential.into(),
        }
    }

    /// Set the email address.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Set the username.
    #[must_use]
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }

    /// Stable subject identifier (`sub` claim or the PAT owner's user id).
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Email address, if known.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Username, if known.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Display name, if known.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// How this identity was established.
    #[must_use]
    pub const fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Returns true for PAT-authenticated callers.
    #[must_use]
    pub fn is_pat(&self) -> bool {
        self.auth_mode == AuthMode::Pat
    }

    /// The credential presented by the caller, for tools that call downstream APIs
    /// on the user's behalf.
    #[must_use]
    pub fn raw_credential(&self) -> &str {
        &self.raw_credential
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject_id", &self.subject_id)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("auth_mode", &self.auth_mode)
            .field("credential", &fingerprint(&self.raw_credential))
            .finish()
    }
}

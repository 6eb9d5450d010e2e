//! Error types for the MCP gatekeeper.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! Each layer owns one enum:
//!
//! - [`UpstreamError`]: talking to the identity provider (JWKS, token, userinfo)
//! - [`AuthError`]: request-time identity resolution
//! - [`ProtocolError`]: JSON-RPC level failures, always rendered as error objects
//! - [`ToolError`]: returned by tool implementations
//! - [`GatewayError`]: OAuth gateway failures, rendered in the OAuth error vocabulary
//! - [`ConfigError`]: invalid startup configuration

use std::time::Duration;

use axum::http::StatusCode;

/// Errors from calls to the upstream identity provider.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The call did not complete within the configured timeout.
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, DNS failure, TLS failure, reset, ...
    #[error("Upstream connection failed: {0}")]
    Network(String),

    /// Upstream answered with a non-success status.
    #[error("Upstream returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Upstream answered 2xx with a body we could not understand.
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// Classify a reqwest failure. `timeout` is the configured budget, reported back
    /// to the caller when the failure was a timeout.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Classify a failure from the retrying middleware client.
    ///
    /// Exhausted retries come back wrapped in [`reqwest_retry::RetryError`]; the last
    /// attempt's error decides the class.
    #[must_use]
    pub fn from_middleware(err: &reqwest_middleware::Error, timeout: Duration) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => Self::from_reqwest(e, timeout),
            reqwest_middleware::Error::Middleware(e) => {
                match e.downcast_ref::<reqwest_retry::RetryError>() {
                    Some(
                        reqwest_retry::RetryError::WithRetries { err, .. }
                        | reqwest_retry::RetryError::Error(err),
                    ) => Self::from_middleware(err, timeout),
                    None => e
                        .chain()
                        .find_map(|cause| cause.downcast_ref::<reqwest::Error>())
                        .map_or_else(
                            || Self::Network(e.to_string()),
                            |inner| Self::from_reqwest(inner, timeout),
                        ),
                }
            }
        }
    }

    /// Returns true if the upstream did not answer in time.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors from identity resolution.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Neither a PAT header nor a bearer token was supplied.
    #[error("Authentication required")]
    MissingCredential,

    /// A credential was supplied but did not verify.
    #[error("Invalid credential: {reason}")]
    InvalidCredential {
        /// Why verification failed (server-side logging only)
        reason: String,
    },

    /// The identity provider could not be reached, so the credential could not be checked.
    #[error("Identity provider unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),
}

impl AuthError {
    /// Create an invalid credential error.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidCredential {
            reason: reason.into(),
        }
    }

    /// HTTP status this failure maps to.
    ///
    /// Upstream outages are never reported as 401: the client's credential may be fine.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredential | Self::InvalidCredential { .. } => StatusCode::UNAUTHORIZED,
            Self::UpstreamUnavailable(UpstreamError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// OAuth error code for the response body and challenge header.
    #[must_use]
    pub const fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "invalid_request",
            Self::InvalidCredential { .. } => "invalid_token",
            Self::UpstreamUnavailable(_) => "temporarily_unavailable",
        }
    }
}

/// JSON-RPC 2.0 error codes used by the dispatcher.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Request arrived before a successful `initialize`.
    pub const SERVER_NOT_INITIALIZED: i32 = -32002;
    /// A method needing an identity was dispatched without one.
    pub const UNAUTHENTICATED: i32 = -32001;
}

/// Protocol-level failures. Always rendered as JSON-RPC error objects.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Body is not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Envelope is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown method name.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Params missing or of the wrong shape.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Method requires a prior successful `initialize`.
    #[error("Server not initialized")]
    NotInitialized,

    /// Method requires a resolved identity.
    #[error("Authentication required")]
    Unauthenticated,

    /// Sanitized internal failure. The message must be safe to show to clients.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// JSON-RPC error code for this error.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => codes::PARSE_ERROR,
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::NotInitialized => codes::SERVER_NOT_INITIALIZED,
            Self::Unauthenticated => codes::UNAUTHENTICATED,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }
}

/// Errors from MCP tool execution.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Unknown tool: {0}")]
    NotFound(String),

    /// Input validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// Arguments did not deserialize into the tool's input type
    #[error("Invalid arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    /// Internal tool logic error. Never shown to the client verbatim.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Convert to the protocol error returned to the client.
    ///
    /// Caller mistakes keep their message; internal failures are replaced by a
    /// generic message naming only the tool.
    #[must_use]
    pub fn to_protocol_error(&self, tool: &str) -> ProtocolError {
        match self {
            Self::NotFound(name) => ProtocolError::InvalidParams(format!("Unknown tool: {name}")),
            Self::Validation { field, message } => {
                ProtocolError::InvalidParams(format!("Invalid input for '{field}': {message}"))
            }
            Self::Arguments(e) => ProtocolError::InvalidParams(format!("Invalid arguments: {e}")),
            Self::Internal(_) => {
                ProtocolError::Internal(format!("Tool '{tool}' failed to execute"))
            }
        }
    }
}

/// A second tool was registered under an existing name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Tool '{0}' is already registered")]
pub struct DuplicateToolError(pub String);

/// Errors from the OAuth gateway handlers.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// Registration body could not be parsed.
    #[error("Invalid client metadata: {0}")]
    InvalidClientMetadata(String),

    /// Userinfo called without a usable bearer token.
    #[error("Missing or malformed bearer token")]
    MissingBearer,

    /// Upstream identity provider unreachable.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl GatewayError {
    /// HTTP status this failure maps to.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidClientMetadata(_) => StatusCode::BAD_REQUEST,
            Self::MissingBearer => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// OAuth error code (`error` field of the response body).
    #[must_use]
    pub const fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClientMetadata(_) => "invalid_client_metadata",
            Self::MissingBearer => "invalid_token",
            Self::Upstream(_) => "server_error",
        }
    }
}

/// Invalid startup configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A URL setting does not parse.
    #[error("Invalid URL for {field}: {source}")]
    InvalidUrl {
        /// Setting name
        field: &'static str,
        /// Parse failure
        source: url::ParseError,
    },

    /// A required setting is empty.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Result type alias for identity resolution.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

//! MCP method dispatch.
//!
//! Turns a request body into zero or more JSON-RPC responses. Authentication has
//! already happened; the caller passes the resolved identity in.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Value, json};

use super::session::{Session, SessionStore};
use super::{EnvelopeError, JsonRpcRequest, JsonRpcResponse};
use crate::auth::Identity;
use crate::config::Config;
use crate::error::ProtocolError;
use crate::tools::ToolRegistry;

/// Protocol versions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Methods understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    NotificationsInitialized,
    NotificationsCancelled,
}

impl Method {
    /// Every method, in table order.
    pub const ALL: [Self; 6] = [
        Self::Initialize,
        Self::Ping,
        Self::ToolsList,
        Self::ToolsCall,
        Self::NotificationsInitialized,
        Self::NotificationsCancelled,
    ];

    /// Look up a method by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::NotificationsInitialized => "notifications/initialized",
            Self::NotificationsCancelled => "notifications/cancelled",
        }
    }

    /// Returns true if the method is rejected before `initialize`.
    #[must_use]
    pub const fn requires_initialization(self) -> bool {
        matches!(self, Self::ToolsList | Self::ToolsCall)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the transport should send back.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// One response object.
    Single(JsonRpcResponse),
    /// Responses for a batch, in input order.
    Batch(Vec<JsonRpcResponse>),
    /// Nothing is owed (notifications only).
    NoContent,
}

/// Outcome plus the session started by this request, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub outcome: DispatchOutcome,
    /// Set when an `initialize` in this request created a session.
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    protocol_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Per-request context shared by every message of a batch.
struct CallContext {
    session: Option<Arc<Session>>,
    identity: Option<Arc<Identity>>,
}

/// Server identity reported by `initialize`.
#[derive(Debug, Clone)]
struct ServerInfo {
    name: String,
    version: String,
    instructions: Option<String>,
}

/// JSON-RPC dispatcher for MCP.
pub struct Dispatcher {
    info: ServerInfo,
    tools: Arc<dyn ToolRegistry>,
    sessions: SessionStore,
    max_batch_size: usize,
}

impl Dispatcher {
    /// Create a dispatcher over `tools`.
    #[must_use]
    pub fn new(config: &Config, tools: Arc<dyn ToolRegistry>, sessions: SessionStore) -> Self {
        let methods: Vec<&str> = Method::ALL.iter().map(|m| m.as_str()).collect();
        tracing::info!(?methods, "MCP dispatcher ready");

        Self {
            info: ServerInfo {
                name: config.server_name.clone(),
                version: config.server_version.clone(),
                instructions: config.instructions.clone(),
            },
            tools,
            sessions,
            max_batch_size: config.max_batch_size,
        }
    }

    /// Tool registry behind this dispatcher.
    #[must_use]
    pub fn tools(&self) -> &Arc<dyn ToolRegistry> {
        &self.tools
    }

    /// Session store behind this dispatcher.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Dispatch a raw request body.
    pub async fn dispatch(
        &self,
        body: &[u8],
        session_id: Option<&str>,
        identity: Option<Arc<Identity>>,
    ) -> DispatchResult {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.dispatch_value(value, session_id, identity).await,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable request body");
                DispatchResult {
                    outcome: DispatchOutcome::Single(JsonRpcResponse::error(
                        None,
                        &ProtocolError::Parse(e.to_string()),
                    )),
                    session_id: None,
                }
            }
        }
    }

    /// Dispatch an already-parsed body: one message or a batch array.
    pub async fn dispatch_value(
        &self,
        body: Value,
        session_id: Option<&str>,
        identity: Option<Arc<Identity>>,
    ) -> DispatchResult {
        let subject = identity.as_ref().map(|i| i.subject_id());
        let session = match session_id {
            Some(id) => self.sessions.get(id, subject).await,
            None => None,
        };
        let ctx = CallContext { session, identity };

        match body {
            Value::Array(messages) => self.dispatch_batch(messages, &ctx).await,
            message => {
                let (response, created) = self.handle_message(message, &ctx).await;
                DispatchResult {
                    outcome: response.map_or(DispatchOutcome::NoContent, DispatchOutcome::Single),
                    session_id: created.map(|s| s.id.clone()),
                }
            }
        }
    }

    async fn dispatch_batch(&self, messages: Vec<Value>, ctx: &CallContext) -> DispatchResult {
        if messages.len() > self.max_batch_size {
            tracing::warn!(size = messages.len(), max = self.max_batch_size, "Batch too large");
            let error = ProtocolError::InvalidRequest(format!(
                "batch of {} messages exceeds the limit of {}",
                messages.len(),
                self.max_batch_size
            ));
            return DispatchResult {
                outcome: DispatchOutcome::Single(JsonRpcResponse::error(None, &error)),
                session_id: None,
            };
        }

        let results =
            join_all(messages.into_iter().map(|message| self.handle_message(message, ctx))).await;

        let mut responses = Vec::with_capacity(results.len());
        let mut session_id = None;
        for (response, created) in results {
            responses.extend(response);
            if let Some(session) = created {
                session_id = Some(session.id.clone());
            }
        }

        let outcome = if responses.is_empty() {
            DispatchOutcome::NoContent
        } else {
            DispatchOutcome::Batch(responses)
        };
        DispatchResult {
            outcome,
            session_id,
        }
    }

    /// Handle one message. Returns the response (if owed) and the session created by
    /// a successful `initialize`.
    async fn handle_message(
        &self,
        message: Value,
        ctx: &CallContext,
    ) -> (Option<JsonRpcResponse>, Option<Arc<Session>>) {
        let request = match JsonRpcRequest::from_value(message) {
            Ok(request) => request,
            Err(EnvelopeError { id, error }) => {
                return (Some(JsonRpcResponse::error(id, &error)), None);
            }
        };

        let Some(method) = Method::from_name(&request.method) else {
            if request.is_notification() {
                tracing::debug!(method = %request.method, "Ignoring unknown notification");
                return (None, None);
            }
            let error = ProtocolError::MethodNotFound(request.method.clone());
            return (Some(JsonRpcResponse::error(request.id, &error)), None);
        };

        tracing::debug!(%method, id = ?request.id, "Dispatching");

        let mut created = None;
        let result = if method.requires_initialization() && ctx.session.is_none() {
            Err(ProtocolError::NotInitialized)
        } else {
            match method {
                Method::Initialize => match self.initialize(&request, ctx).await {
                    Ok((result, session)) => {
                        created = Some(session);
                        Ok(result)
                    }
                    Err(e) => Err(e),
                },
                Method::Ping | Method::NotificationsInitialized => Ok(json!({})),
                Method::NotificationsCancelled => {
                    tracing::debug!(params = ?request.params, "Request cancelled by client");
                    Ok(json!({}))
                }
                Method::ToolsList => self.list_tools().await,
                Method::ToolsCall => self.call_tool(&request, ctx).await,
            }
        };

        if request.is_notification() {
            if let Err(e) = &result {
                tracing::debug!(%method, error = %e, "Notification failed");
            }
            return (None, created);
        }

        let response = match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => JsonRpcResponse::error(request.id, &e),
        };
        (Some(response), created)
    }

    async fn initialize(
        &self,
        request: &JsonRpcRequest,
        ctx: &CallContext,
    ) -> Result<(Value, Arc<Session>), ProtocolError> {
        let params: InitializeParams = parse_params(request)?;
        let version = negotiate_version(params.protocol_version.as_deref())?;

        let subject = ctx.identity.as_ref().map(|i| i.subject_id());
        let session = self.sessions.create(version, subject).await;

        tracing::info!(
            protocol_version = version,
            requested = ?params.protocol_version,
            session_id = %session.id,
            "Client initialized"
        );

        let mut result = json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version
            }
        });
        if let Some(instructions) = &self.info.instructions {
            result["instructions"] = Value::String(instructions.clone());
        }

        Ok((result, session))
    }

    async fn list_tools(&self) -> Result<Value, ProtocolError> {
        let tools = self.tools.list_tools().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to list tools");
            ProtocolError::Internal("Failed to list tools".into())
        })?;

        Ok(json!({ "tools": tools }))
    }

    async fn call_tool(
        &self,
        request: &JsonRpcRequest,
        ctx: &CallContext,
    ) -> Result<Value, ProtocolError> {
        let identity = ctx.identity.as_ref().ok_or(ProtocolError::Unauthenticated)?;
        let params: CallToolParams = parse_params(request)?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let name = params.name;

        tracing::info!(tool = %name, subject = %identity.subject_id(), "Executing tool");

        let call = self.tools.call_tool(&name, arguments, identity);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => serde_json::to_value(result).map_err(|e| {
                tracing::error!(tool = %name, error = %e, "Failed to serialize tool result");
                ProtocolError::Internal(format!("Tool '{name}' failed to execute"))
            }),
            Ok(Err(e)) => {
                let error = e.to_protocol_error(&name);
                if error.code() == crate::error::codes::INTERNAL_ERROR {
                    tracing::error!(tool = %name, error = %e, "Tool failed");
                } else {
                    tracing::info!(tool = %name, error = %e, "Tool rejected call");
                }
                Err(error)
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                tracing::error!(tool = %name, panic = %detail, "Tool panicked");
                Err(ProtocolError::Internal(format!("Tool '{name}' failed to execute")))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("info", &self.info)
            .field("sessions", &self.sessions)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    request: &JsonRpcRequest,
) -> Result<T, ProtocolError> {
    let params = request.params_object()?;
    serde_json::from_value(Value::Object(params))
        .map_err(|e| ProtocolError::InvalidParams(e.to_string()))
}

/// Pick the protocol version for a client.
///
/// A supported version is echoed. Otherwise the newest supported version older than
/// the request is chosen. A request older than every supported version fails, and a
/// missing version gets the oldest supported one.
pub fn negotiate_version(requested: Option<&str>) -> Result<&'static str, ProtocolError> {
    let oldest = SUPPORTED_PROTOCOL_VERSIONS[SUPPORTED_PROTOCOL_VERSIONS.len() - 1];
    let Some(requested) = requested else {
        return Ok(oldest);
    };

    if !is_version_date(requested) {
        return Err(ProtocolError::InvalidParams(format!(
            "protocolVersion '{requested}' is not a YYYY-MM-DD date"
        )));
    }

    // Versions are ISO dates, so lexical order is chronological order.
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v <= requested)
        .ok_or_else(|| {
            ProtocolError::InvalidRequest(format!(
                "Unsupported protocol version '{requested}'; supported: {}",
                SUPPORTED_PROTOCOL_VERSIONS.join(", ")
            ))
        })
}

fn is_version_date(s: &str) -> bool {
    s.len() == 10
        && s.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_round_trip() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.as_str()), Some(method));
        }
        assert_eq!(Method::from_name("tools/unknown"), None);
    }

    #[test]
    fn test_negotiate_version() {
        assert_eq!(negotiate_version(Some("2025-06-18")).unwrap(), "2025-06-18");
        assert_eq!(negotiate_version(Some("2025-03-26")).unwrap(), "2025-03-26");
        assert_eq!(negotiate_version(Some("2099-01-01")).unwrap(), "2025-06-18");
        assert_eq!(negotiate_version(Some("2025-01-01")).unwrap(), "2024-11-05");
        assert_eq!(negotiate_version(None).unwrap(), "2024-11-05");

        let err = negotiate_version(Some("2023-01-01")).unwrap_err();
        assert_eq!(err.code(), -32600);

        let err = negotiate_version(Some("latest")).unwrap_err();
        assert_eq!(err.code(), -32602);
    }
}

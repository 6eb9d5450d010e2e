//! MCP Gatekeeper
//!
//! Authentication and dispatch core for Model Context Protocol (MCP) servers served
//! over HTTP.
//!
//! # Features
//!
//! - **Dual-mode auth**: OAuth bearer tokens verified against the identity provider's
//!   JWKS, or personal access tokens checked by an application callback
//! - **JSON-RPC 2.0 dispatch**: initialize-before-use, batches, sanitized tool failures
//! - **OAuth gateway**: discovery metadata plus authorize/token/userinfo proxies and
//!   dynamic registration answered with one shared public client
//! - **Cached**: JWKS cached per issuer with single-flight refresh
//!
//! # Example
//!
//! ```no_run
//! use mcp_gatekeeper::{Config, McpServer, UserInfo, config::PatSettings};
//! use mcp_gatekeeper::tools::{ToolSet, demo::EchoTool};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new("my-server", "1.0.0")
//!         .with_pat(PatSettings::new("X-API-Key", "pat_"));
//!     let tools = ToolSet::new().with(EchoTool)?;
//!
//!     McpServer::new(config, tools)
//!         .with_pat_verifier(|token: String| async move {
//!             (token == "secret").then(|| UserInfo::new("user-1"))
//!         })
//!         .run_http(8000)
//!         .await
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;

pub use auth::{AuthMode, Identity, IdentityResolver, JwksCache, PatVerifier, UserInfo};
pub use config::{Config, OAuthRouterConfig};
pub use error::{AuthError, ProtocolError, ToolError};
pub use protocol::Dispatcher;
pub use server::McpServer;
pub use tools::{McpTool, ToolRegistry, ToolSet};

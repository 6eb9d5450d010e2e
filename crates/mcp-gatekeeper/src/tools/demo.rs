//! Demo tools shipped with the binary.

use serde::Deserialize;

use super::{CallToolResult, McpTool};
use crate::auth::Identity;
use crate::error::{ToolError, ToolResult};

/// Echoes back the input message.
pub struct EchoTool;

#[derive(Debug, Deserialize)]
struct EchoInput {
    message: String,
}

#[async_trait::async_trait]
impl McpTool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echoes back the input message"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Message to echo back"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        _identity: &Identity,
    ) -> ToolResult<CallToolResult> {
        let input: EchoInput = serde_json::from_value(input)?;
        Ok(CallToolResult::text(format!("Echo: {}", input.message)))
    }
}

/// Greets a user by name, defaulting to the caller's display name.
pub struct GreetTool;

#[derive(Debug, Deserialize)]
struct GreetInput {
    #[serde(default)]
    name: Option<String>,
}

#[async_trait::async_trait]
impl McpTool for GreetTool {
    fn name(&self) -> &'static str {
        "greet"
    }

    fn description(&self) -> &'static str {
        "Greets a user by name"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Name to greet (defaults to the caller)"
                }
            }
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        identity: &Identity,
    ) -> ToolResult<CallToolResult> {
        let input: GreetInput = serde_json::from_value(input)?;
        let name = input
            .name
            .or_else(|| identity.display_name().map(str::to_owned))
            .unwrap_or_else(|| identity.subject_id().to_owned());

        if name.trim().is_empty() {
            return Err(ToolError::validation("name", "cannot be empty"));
        }

        Ok(CallToolResult::text(format!("Hello, {name}!")))
    }
}

//! Tool registry capability.
//!
//! The dispatcher only sees [`ToolRegistry`]: enumerate tools, execute one by name.
//! Applications either implement it directly or register one [`McpTool`] per tool
//! in a [`ToolSet`].

pub mod demo;

use serde::Serialize;

use crate::auth::Identity;
use crate::error::{DuplicateToolError, ToolError, ToolResult};

/// MCP tool description for `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

impl Tool {
    /// Create a tool description.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// One block of tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text {
        text: String,
    },
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    /// Tool-level failure reported to the model rather than as a protocol error.
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Successful single-text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Tool-level failure the model should see.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }
}

/// Capability set the dispatcher is polymorphic over.
#[async_trait::async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Enumerate available tools. Names must be unique.
    async fn list_tools(&self) -> ToolResult<Vec<Tool>>;

    /// Execute the named tool for `identity`.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        identity: &Identity,
    ) -> ToolResult<CallToolResult>;
}

/// Trait for MCP tools.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (e.g., "echo").
    fn name(&self) -> &'static str;

    /// Tool description for LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input on behalf of `identity`.
    async fn execute(
        &self,
        input: serde_json::Value,
        identity: &Identity,
    ) -> ToolResult<CallToolResult>;
}

/// Registry of [`McpTool`]s with unique names.
#[derive(Default)]
pub struct ToolSet {
    tools: Vec<Box<dyn McpTool>>,
}

impl ToolSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns error if a tool with the same name is already registered.
    pub fn register(&mut self, tool: impl McpTool + 'static) -> Result<(), DuplicateToolError> {
        if self.get(tool.name()).is_some() {
            return Err(DuplicateToolError(tool.name().to_string()));
        }
        self.tools.push(Box::new(tool));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, tool: impl McpTool + 'static) -> Result<Self, DuplicateToolError> {
        self.register(tool)?;
        Ok(self)
    }

    /// Get tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn McpTool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait::async_trait]
impl ToolRegistry for ToolSet {
    async fn list_tools(&self) -> ToolResult<Vec<Tool>> {
        Ok(self
            .tools
            .iter()
            .map(|t| Tool::new(t.name(), t.description(), t.input_schema()))
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        identity: &Identity,
    ) -> ToolResult<CallToolResult> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments, identity).await
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

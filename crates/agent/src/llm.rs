use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A tool call requested by the model. `arguments` is the raw JSON text the
/// model produced; it is decoded only when the call is dispatched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: Option<String>, tool_calls: Vec<ToolInvocation> },
    Tool { tool_call_id: String, name: String, content: String },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant { content: Some(content.into()), tool_calls: Vec::new() }
    }

    pub fn assistant_tool_call(invocation: ToolInvocation) -> Self {
        Self::Assistant { content: None, tool_calls: vec![invocation] }
    }

    pub fn tool_result(invocation: &ToolInvocation, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: invocation.id.clone(),
            name: invocation.name.clone(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Text content, with an absent body read as empty.
    pub fn text(&self) -> &str {
        match self {
            Self::System { content } | Self::User { content } | Self::Tool { content, .. } => {
                content
            }
            Self::Assistant { content, .. } => content.as_deref().unwrap_or_default(),
        }
    }
}

/// Catalog entry offered to the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Empty means the model is not offered any tools for this call.
    pub tools: Vec<ToolSpec>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), tool_calls: Vec::new() }
    }

    pub fn tools(tool_calls: Vec<ToolInvocation>) -> Self {
        Self { content: None, tool_calls }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("client is not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> Result<ModelReply, LlmError>;
}

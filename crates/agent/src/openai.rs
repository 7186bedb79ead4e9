//! Client for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Works against OpenAI itself and against Ollama's OpenAI-compatible API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use ordermate_core::config::{LlmConfig, LlmProvider};

use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError, ModelReply, ToolInvocation};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

struct OpenAiClientInner {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("endpoint", &self.inner.endpoint)
            .field("model", &self.inner.model)
            .finish()
    }
}

impl OpenAiClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` when the OpenAI provider has no API key, and
    /// `Unauthorized` when the key cannot be sent as a header.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let api_key = config
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim().to_string())
            .filter(|key| !key.is_empty());

        match (config.provider, api_key) {
            (_, Some(key)) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                    LlmError::Unauthorized("API key contains invalid header characters".to_string())
                })?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            (LlmProvider::OpenAi, None) => {
                return Err(LlmError::NotConfigured("llm.api_key is not set".to_string()));
            }
            (LlmProvider::Ollama, None) => {}
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        let base_url = config.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty());
        let base_url = base_url.unwrap_or(match config.provider {
            LlmProvider::OpenAi => OPENAI_BASE_URL,
            LlmProvider::Ollama => OLLAMA_BASE_URL,
        });

        Ok(Self {
            inner: Arc::new(OpenAiClientInner {
                http,
                endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
                model: config.model.clone(),
            }),
        })
    }

    async fn error_from_status(status: StatusCode, response: reqwest::Response) -> LlmError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(60);
            return LlmError::RateLimited(retry_after);
        }

        if status == StatusCode::UNAUTHORIZED {
            return LlmError::Unauthorized("invalid API key".to_string());
        }

        match response.text().await {
            Ok(body) => {
                let message = serde_json::from_str::<ApiErrorResponse>(&body)
                    .map(|parsed| parsed.error.message)
                    .unwrap_or(body);
                LlmError::Api { status: status.as_u16(), message }
            }
            Err(error) => LlmError::Http(error),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.inner.model
    }

    #[instrument(
        skip(self, request),
        fields(
            model = %self.inner.model,
            messages = request.messages.len(),
            tools = request.tools.len()
        )
    )]
    async fn complete(&self, request: ChatRequest) -> Result<ModelReply, LlmError> {
        let body = WireRequest::from_request(&self.inner.model, &request);
        let response = self.inner.http.post(&self.inner.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_status(status, response).await);
        }

        let text = response.text().await?;
        let parsed: WireResponse = serde_json::from_str(&text)
            .map_err(|error| LlmError::Parse(format!("unexpected completion body: {error}")))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LlmError::Parse("completion has no choices".to_string()))?;

        Ok(ModelReply {
            content: message.content,
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolInvocation {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    max_tokens: u32,
}

impl<'a> WireRequest<'a> {
    fn from_request(model: &'a str, request: &'a ChatRequest) -> Self {
        let tools: Option<Vec<WireTool<'a>>> = (!request.tools.is_empty()).then(|| {
            request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: tool.name,
                        description: tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect()
        });

        Self {
            model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tool_choice: tools.as_ref().map(|_| "auto"),
            tools,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

/// Outgoing message. `content` is always a string; providers reject `null`
/// content on assistant tool-call entries.
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCallOut<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        let mut wire = Self {
            role: message.role(),
            content: message.text(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        };

        match message {
            ChatMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                wire.tool_calls = Some(
                    tool_calls
                        .iter()
                        .map(|call| WireToolCallOut {
                            id: &call.id,
                            kind: "function",
                            function: WireFunctionCallOut {
                                name: &call.name,
                                arguments: &call.arguments,
                            },
                        })
                        .collect(),
                );
            }
            ChatMessage::Tool { tool_call_id, name, .. } => {
                wire.tool_call_id = Some(tool_call_id.as_str());
                wire.name = Some(name.as_str());
            }
            _ => {}
        }

        wire
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct WireToolCallOut<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCallOut<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionCallOut<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReplyMessage,
}

#[derive(Debug, Deserialize)]
struct WireReplyMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallIn>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallIn {
    id: String,
    function: WireFunctionCallIn,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCallIn {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

//! Chat-completions client.
//!
//! Speaks the OpenAI `/chat/completions` wire format with function tools. The
//! orchestrator only sees the [`CompletionBackend`] trait so tests can script
//! model replies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::metrics::UPSTREAM_FAILURES;

const TEMPERATURE: f32 = 0.3;

// Per-call ceiling, the orchestrator deadline is usually shorter
const HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    // null on assistant turns that only carry tool calls
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(call: &ToolCall, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: Some(call.id.clone()),
            name: Some(call.function.name.clone()),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    temperature: f32,
    max_tokens: u32,
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Sends the conversation and returns the assistant's next message.
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value])
    -> Result<ChatMessage, ApiError>;

    fn model(&self) -> &str;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        max_tokens: u32,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ChatMessage, ApiError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice: (!tools.is_empty()).then_some("auto"),
            temperature: TEMPERATURE,
            max_tokens: self.max_tokens,
        };

        debug!(messages = messages.len(), "calling completion API");
        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream(format!("Request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            // the body may echo request details, only the status is logged
            return Err(upstream(format!("completion API returned {}", status)));
        }

        let parsed: CompletionResponse = res
            .json()
            .await
            .map_err(|e| upstream(format!("Parse Error: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| upstream("completion API returned no choices".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Stand-in used when no API key is configured, every call fails fast
pub struct Unconfigured {
    pub model: String,
}

#[async_trait]
impl CompletionBackend for Unconfigured {
    async fn complete(&self, _: &[ChatMessage], _: &[Value]) -> Result<ChatMessage, ApiError> {
        Err(upstream("OPENAI_API_KEY not configured".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn upstream(message: String) -> ApiError {
    UPSTREAM_FAILURES.inc();
    error!(error = %message, "completion API failure");
    ApiError::Upstream(message)
}

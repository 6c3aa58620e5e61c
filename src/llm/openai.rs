//! OpenAI-compatible chat-completions client.
//!
//! Implements the LlmClient trait for any endpoint that speaks the OpenAI
//! chat-completions protocol with function tools: OpenAI itself and Gemini's
//! OpenAI-compatible surface.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{MedeaseError, Result};
use crate::llm::tools::ToolDefinition;
use crate::llm::types::{LlmResponse, Message, ToolCall};
use crate::llm::{LlmClient, LlmProvider};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Maximum number of retry attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Model to use (e.g., "gemini-2.5-flash", "gpt-4o-mini").
    pub model: String,
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Creates a config for `provider` with its default endpoint.
    pub fn new(provider: LlmProvider, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: provider.default_base_url().to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Overrides the endpoint base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// OpenAI-compatible LLM client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedeaseError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Converts internal messages to the chat-completions format.
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str().to_string(),
                content: if m.content.is_empty() && !m.tool_calls.is_empty() {
                    None
                } else {
                    Some(m.content.clone())
                },
                tool_calls: (!m.tool_calls.is_empty()).then(|| {
                    m.tool_calls
                        .iter()
                        .map(|call| OpenAiToolCall {
                            id: call.id.clone(),
                            kind: "function".to_string(),
                            function: OpenAiFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|tool| OpenAiTool {
                kind: "function".to_string(),
                function: OpenAiFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }

    /// Turns the first choice of a response into an `LlmResponse`.
    fn parse_response(body: &str) -> Result<LlmResponse> {
        let response: OpenAiResponse = serde_json::from_str(body)
            .map_err(|e| MedeaseError::llm(format!("Failed to parse response: {}", e)))?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| MedeaseError::llm("No response from the LLM"))?;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, call)| ToolCall {
                id: if call.id.is_empty() {
                    format!("call_{}", i + 1)
                } else {
                    call.id
                },
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(LlmResponse::with_tool_calls(
            message.content.unwrap_or_default(),
            tool_calls,
        ))
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(status: StatusCode, body: &str) -> (MedeaseError, bool) {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return (
                MedeaseError::llm("Authentication failed. Check your LLM API key."),
                false,
            );
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return (
                MedeaseError::llm("Rate limited. Please wait and try again."),
                true,
            );
        }

        let is_retryable = status.is_server_error();

        // Gemini wraps the error object in a one-element array.
        let parsed = serde_json::from_str::<OpenAiErrorResponse>(body)
            .map(|r| r.error.message)
            .or_else(|_| {
                serde_json::from_str::<Vec<OpenAiErrorResponse>>(body).map(|mut r| {
                    r.pop()
                        .map(|e| e.error.message)
                        .unwrap_or_else(|| body.to_string())
                })
            });

        match parsed {
            Ok(message) => (
                MedeaseError::llm(format!("LLM API error: {}", message)),
                is_retryable,
            ),
            Err(_) => (
                MedeaseError::llm(format!("LLM API error ({}): {}", status, body)),
                is_retryable,
            ),
        }
    }

    /// Determines if a request error is retryable.
    fn is_retryable_request_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            tools: Self::convert_tools(tools),
        };
        let url = self.config.completions_url();

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(
                model = %self.config.model,
                attempt,
                "LLM request attempt {} of {}",
                attempt,
                MAX_RETRY_ATTEMPTS
            );

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| MedeaseError::llm(format!("Failed to read response: {}", e)))?;

                    if status.is_success() {
                        return Self::parse_response(&body);
                    }

                    let (error, is_retryable) = Self::parse_error(status, &body);
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(
                        "LLM request failed (attempt {}), retrying in {:?}: {}",
                        attempt, delay, status
                    );
                }
                Err(e) => {
                    let is_retryable = Self::is_retryable_request_error(&e);
                    let error = if e.is_timeout() {
                        MedeaseError::llm("Request timed out. Try again.")
                    } else if e.is_connect() {
                        MedeaseError::llm("Failed to connect to the LLM API. Check your network.")
                    } else {
                        MedeaseError::llm(format!("Request failed: {}", e))
                    };
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(
                        "LLM request failed (attempt {}), retrying in {:?}",
                        attempt, delay
                    );
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error.unwrap_or_else(|| MedeaseError::llm("LLM request was not attempted")))
    }
}

// Chat-completions API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}

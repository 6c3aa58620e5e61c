//! LLM integration for the pharmacy agent.
//!
//! Provides the tool-calling client trait, an OpenAI-compatible client (used
//! for both Gemini and OpenAI) and a deterministic mock.

mod factory;
mod mock;
mod openai;
mod prompt;
pub mod tools;
mod types;

pub use factory::create_client;
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use prompt::{build_messages, build_system_prompt};
pub use tools::{get_tool_definitions, ToolDefinition};
pub use types::{Conversation, LlmResponse, Message, Role, ToolCall};

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::Result;

/// Trait for LLM clients that support function calling.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends the conversation with the available tools and returns either
    /// text, tool calls, or both.
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Google Gemini through its OpenAI-compatible endpoint.
    #[default]
    Gemini,
    /// OpenAI (GPT-4o, etc.)
    OpenAi,
    /// Mock client for testing (no API key required)
    Mock,
}

impl LlmProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::OpenAi => "gpt-4o-mini",
            Self::Mock => "mock",
        }
    }

    /// Chat-completions base URL used when none is configured.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::OpenAi | Self::Mock => "https://api.openai.com/v1",
        }
    }

    /// Environment variable named in "missing key" errors.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAi | Self::Mock => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

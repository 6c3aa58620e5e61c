//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{MedeaseError, Result};
use crate::llm::{LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig};

/// Creates an LLM client from the LLM settings.
///
/// The API key comes from configuration only; environment variables are
/// folded into `LlmConfig` at startup. Model and base URL fall back to the
/// provider's defaults.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let provider: LlmProvider = config.provider.parse().map_err(MedeaseError::config)?;

    match provider {
        LlmProvider::Gemini | LlmProvider::OpenAi => {
            let key = config.api_key.clone().ok_or_else(|| {
                MedeaseError::llm(format!(
                    "No API key configured. Set llm.api_key or {}.",
                    provider.api_key_env()
                ))
            })?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string());

            let mut client_config =
                OpenAiConfig::new(provider, key, model).with_timeout(config.timeout_secs);
            if let Some(base_url) = &config.base_url {
                client_config = client_config.with_base_url(base_url.clone());
            }

            tracing::info!(provider = %provider, model = %client_config.model, "LLM client ready");
            Ok(Arc::new(OpenAiClient::new(client_config)?))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}

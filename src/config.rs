//! Configuration management for MedEase.
//!
//! Handles loading configuration from a TOML file and filling unset fields
//! from environment variables. The environment is read here, once, at
//! startup; everything downstream receives explicit config structs.

use crate::error::{MedeaseError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure for MedEase.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Data warehouse settings.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// SMS provider settings.
    #[serde(default)]
    pub sms: SmsConfig,

    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Agent loop limits.
    #[serde(default)]
    pub agent: AgentConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
        }
    }
}

/// Which warehouse implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    #[default]
    BigQuery,
    /// In-memory sample data.
    Mock,
}

/// Data warehouse settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub backend: WarehouseBackend,

    /// Google Cloud project that owns the dataset and runs the jobs.
    pub project_id: Option<String>,

    /// Dataset holding the pharmacy tables.
    pub dataset: Option<String>,

    /// Job location (e.g. "US"); BigQuery picks one when unset.
    pub location: Option<String>,

    /// Service-account key file. Application-default credentials are used when unset.
    pub credentials_file: Option<PathBuf>,

    /// Pre-minted OAuth access token; takes precedence over any credentials.
    pub access_token: Option<String>,

    /// BigQuery REST base URL.
    #[serde(default = "default_bigquery_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_warehouse_timeout")]
    pub timeout_secs: u64,

    /// Row limit used when a caller does not give one.
    #[serde(default = "default_row_limit")]
    pub default_limit: u32,

    /// Table names inside the dataset.
    #[serde(default)]
    pub tables: TableNames,
}

fn default_bigquery_endpoint() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_warehouse_timeout() -> u64 {
    30
}

fn default_row_limit() -> u32 {
    50
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::default(),
            project_id: None,
            dataset: None,
            location: None,
            credentials_file: None,
            access_token: None,
            endpoint: default_bigquery_endpoint(),
            timeout_secs: default_warehouse_timeout(),
            default_limit: default_row_limit(),
            tables: TableNames::default(),
        }
    }
}

impl WarehouseConfig {
    /// Applies GOOGLE_CLOUD_PROJECT, BQ_DATASET_ID, BQ_LOCATION,
    /// GOOGLE_APPLICATION_CREDENTIALS and BIGQUERY_ACCESS_TOKEN as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.project_id.is_none() {
            self.project_id = env_var("GOOGLE_CLOUD_PROJECT");
        }
        if self.dataset.is_none() {
            self.dataset = env_var("BQ_DATASET_ID");
        }
        if self.location.is_none() {
            self.location = env_var("BQ_LOCATION");
        }
        if self.credentials_file.is_none() {
            self.credentials_file = env_var("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from);
        }
        if self.access_token.is_none() {
            self.access_token = env_var("BIGQUERY_ACCESS_TOKEN");
        }
    }

    /// Returns the project id, or a configuration error naming the missing setting.
    pub fn require_project(&self) -> Result<&str> {
        self.project_id.as_deref().ok_or_else(|| {
            MedeaseError::config(
                "warehouse.project_id is required (or set GOOGLE_CLOUD_PROJECT)",
            )
        })
    }

    /// Returns the dataset, or a configuration error naming the missing setting.
    pub fn require_dataset(&self) -> Result<&str> {
        self.dataset.as_deref().ok_or_else(|| {
            MedeaseError::config("warehouse.dataset is required (or set BQ_DATASET_ID)")
        })
    }

    fn validate(&self) -> Result<()> {
        if self.backend == WarehouseBackend::BigQuery {
            self.require_project()?;
            self.require_dataset()?;
            parse_url("warehouse.endpoint", &self.endpoint)?;
        }
        if self.default_limit == 0 {
            return Err(MedeaseError::config(
                "warehouse.default_limit must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Table names inside the configured dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableNames {
    #[serde(default = "default_inventory_table")]
    pub inventory: String,

    #[serde(default = "default_prescriptions_table")]
    pub prescriptions: String,

    #[serde(default = "default_users_table")]
    pub users: String,
}

fn default_inventory_table() -> String {
    "Inventory".to_string()
}

fn default_prescriptions_table() -> String {
    "Prescriptions".to_string()
}

fn default_users_table() -> String {
    "Users".to_string()
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            inventory: default_inventory_table(),
            prescriptions: default_prescriptions_table(),
            users: default_users_table(),
        }
    }
}

/// Which SMS implementation to send through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsBackend {
    #[default]
    Twilio,
    /// Records messages instead of sending them.
    Mock,
}

/// SMS provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub backend: SmsBackend,

    pub account_sid: Option<String>,

    /// Twilio auth token (not recommended to store in config).
    pub auth_token: Option<String>,

    /// Sending number, in E.164 form.
    pub from_number: Option<String>,

    /// Twilio REST base URL.
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,

    #[serde(default = "default_sms_timeout")]
    pub timeout_secs: u64,
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn default_sms_timeout() -> u64 {
    15
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            backend: SmsBackend::default(),
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base: default_twilio_api_base(),
            timeout_secs: default_sms_timeout(),
        }
    }
}

impl SmsConfig {
    /// Applies TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.account_sid.is_none() {
            self.account_sid = env_var("TWILIO_ACCOUNT_SID");
        }
        if self.auth_token.is_none() {
            self.auth_token = env_var("TWILIO_AUTH_TOKEN");
        }
        if self.from_number.is_none() {
            self.from_number = env_var("TWILIO_PHONE_NUMBER");
        }
    }

    /// Returns true when all three Twilio credentials are present.
    pub fn has_credentials(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.backend != SmsBackend::Twilio {
            return Ok(());
        }
        let present = [&self.account_sid, &self.auth_token, &self.from_number]
            .iter()
            .filter(|v| v.is_some())
            .count();
        if present != 0 && present != 3 {
            return Err(MedeaseError::config(
                "Twilio needs account_sid, auth_token and from_number together \
                 (or TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, TWILIO_PHONE_NUMBER)",
            ));
        }
        parse_url("sms.api_base", &self.api_base)?;
        Ok(())
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "gemini", "openai" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name; the provider's default when unset.
    pub model: Option<String>,

    /// API key (not recommended to store in config).
    pub api_key: Option<String>,

    /// Chat-completions base URL; the provider's default when unset.
    pub base_url: Option<String>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key: None,
            base_url: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Applies the provider's API key variable (GEMINI_API_KEY or OPENAI_API_KEY).
    pub fn apply_env_defaults(&mut self) {
        if self.api_key.is_some() {
            return;
        }
        self.api_key = match self.provider.to_lowercase().as_str() {
            "gemini" | "google" => env_var("GEMINI_API_KEY").or_else(|| env_var("GOOGLE_API_KEY")),
            "openai" => env_var("OPENAI_API_KEY"),
            _ => None,
        };
    }

    fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.base_url {
            parse_url("llm.base_url", base_url)?;
        }
        Ok(())
    }
}

/// Agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model round-trips per question.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// User turns kept in a session's history.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Sessions kept in memory; the least recently used is dropped first.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_steps() -> usize {
    8
}

fn default_max_turns() -> usize {
    20
}

fn default_max_sessions() -> usize {
    1000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_turns: default_max_turns(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("medease")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| MedeaseError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            MedeaseError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment variable defaults to every section.
    pub fn apply_env_defaults(&mut self) {
        self.warehouse.apply_env_defaults();
        self.sms.apply_env_defaults();
        self.llm.apply_env_defaults();
    }

    /// Switches every external collaborator to its in-memory stand-in.
    pub fn use_mocks(&mut self) {
        self.warehouse.backend = WarehouseBackend::Mock;
        self.sms.backend = SmsBackend::Mock;
        self.llm.provider = "mock".to_string();
    }

    /// Checks the settings the selected backends need.
    pub fn validate(&self) -> Result<()> {
        self.warehouse.validate()?;
        self.sms.validate()?;
        self.llm.validate()?;
        if self.agent.max_steps == 0 {
            return Err(MedeaseError::config("agent.max_steps must be at least 1"));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| MedeaseError::config(format!("Invalid {field} '{value}': {e}")))
}

//! Twilio SMS client.
//!
//! Sends messages through the Twilio Messages REST endpoint with HTTP basic
//! auth (account SID + auth token).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{SmsGateway, SmsReceipt};
use crate::config::SmsConfig;
use crate::error::{MedeaseError, Result};

/// Twilio REST client.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioClient {
    /// Creates a client from SMS settings; all three credentials are required.
    pub fn from_config(config: &SmsConfig) -> Result<Self> {
        let missing = |name: &str| MedeaseError::config(format!("sms.{name} is required for Twilio"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedeaseError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone().ok_or_else(|| missing("account_sid"))?,
            auth_token: config.auth_token.clone().ok_or_else(|| missing("auth_token"))?,
            from_number: config.from_number.clone().ok_or_else(|| missing("from_number"))?,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }

    /// Parses a Twilio error response.
    fn parse_error(status: StatusCode, body: &str) -> MedeaseError {
        if status == StatusCode::UNAUTHORIZED {
            return MedeaseError::sms("Authentication failed. Check TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN.");
        }

        match serde_json::from_str::<TwilioError>(body) {
            Ok(error) => match error.code {
                Some(code) => MedeaseError::sms(format!("Twilio error {}: {}", code, error.message)),
                None => MedeaseError::sms(format!("Twilio error: {}", error.message)),
            },
            Err(_) => MedeaseError::sms(format!("Twilio API error ({}): {}", status, body)),
        }
    }
}

#[async_trait]
impl SmsGateway for TwilioClient {
    async fn send(&self, to: &str, body: &str) -> Result<SmsReceipt> {
        let form = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MedeaseError::sms("Request to Twilio timed out")
                } else {
                    MedeaseError::sms(format!("Request to Twilio failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MedeaseError::sms(format!("Failed to read Twilio response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &text));
        }

        let message: TwilioMessage = serde_json::from_str(&text)
            .map_err(|e| MedeaseError::sms(format!("Failed to parse Twilio response: {}", e)))?;

        debug!(sid = %message.sid, status = %message.status, "SMS accepted by Twilio");

        Ok(SmsReceipt {
            sid: message.sid,
            status: message.status,
            to: message.to.unwrap_or_else(|| to.to_string()),
        })
    }
}

// Twilio API types

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
    #[serde(default)]
    status: String,
    to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    code: Option<i64>,
    message: String,
}

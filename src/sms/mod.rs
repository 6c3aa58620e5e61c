//! SMS delivery for patient notifications.
//!
//! Provides the `SmsGateway` trait, US phone number normalization, a Twilio
//! client and a recording mock.

mod mock;
mod twilio;

pub use mock::{MockSmsGateway, SentMessage};
pub use twilio::TwilioClient;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{SmsBackend, SmsConfig};
use crate::error::{MedeaseError, Result};

/// Provider acknowledgement for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsReceipt {
    /// Provider message id.
    pub sid: String,
    /// Provider delivery status at acceptance time (e.g. "queued").
    pub status: String,
    /// Destination, in E.164 form.
    pub to: String,
}

/// Trait defining the interface for SMS providers.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Sends `body` to a number already in E.164 form.
    async fn send(&self, to: &str, body: &str) -> Result<SmsReceipt>;
}

/// Creates the SMS gateway for the configured backend.
///
/// Twilio without credentials yields a gateway that rejects every send, so
/// the rest of the service still runs; notification attempts then report an
/// error payload.
pub fn connect(config: &SmsConfig) -> Result<Arc<dyn SmsGateway>> {
    match config.backend {
        SmsBackend::Twilio if config.has_credentials() => {
            Ok(Arc::new(TwilioClient::from_config(config)?))
        }
        SmsBackend::Twilio => {
            tracing::warn!("Twilio credentials are not configured; SMS notifications are disabled");
            Ok(Arc::new(DisabledSmsGateway))
        }
        SmsBackend::Mock => Ok(Arc::new(MockSmsGateway::new())),
    }
}

/// Gateway used when no provider is configured.
struct DisabledSmsGateway;

#[async_trait]
impl SmsGateway for DisabledSmsGateway {
    async fn send(&self, _to: &str, _body: &str) -> Result<SmsReceipt> {
        Err(MedeaseError::sms(
            "SMS is not configured (set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER)",
        ))
    }
}

/// Normalizes a US phone number to E.164 (`+1XXXXXXXXXX`).
///
/// Non-digits are ignored. Ten digits get a `+1` prefix; eleven digits are
/// accepted when the first is the country code `1`.
pub fn normalize_us_phone(phone: &str) -> Result<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();

    match digits.len() {
        10 => Ok(format!("+1{digits}")),
        11 if digits.starts_with('1') => Ok(format!("+{digits}")),
        _ => Err(MedeaseError::sms(format!(
            "Invalid US phone number format: {phone}"
        ))),
    }
}

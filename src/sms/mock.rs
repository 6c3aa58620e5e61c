//! Mock SMS gateway for testing and `--mock` mode.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;

use super::{SmsGateway, SmsReceipt};
use crate::error::{MedeaseError, Result};

/// A message captured by the mock gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub to: String,
    pub body: String,
}

/// Records messages instead of sending them.
#[derive(Debug, Default)]
pub struct MockSmsGateway {
    sent: Mutex<Vec<SentMessage>>,
    failure: Option<String>,
}

impl MockSmsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Returns every message accepted so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl SmsGateway for MockSmsGateway {
    async fn send(&self, to: &str, body: &str) -> Result<SmsReceipt> {
        if let Some(message) = &self.failure {
            return Err(MedeaseError::sms(message.clone()));
        }

        let mut sent = self
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sent.push(SentMessage {
            to: to.to_string(),
            body: body.to_string(),
        });

        Ok(SmsReceipt {
            sid: format!("SM{:032}", sent.len()),
            status: "queued".to_string(),
            to: to.to_string(),
        })
    }
}

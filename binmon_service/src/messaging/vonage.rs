/// Vonage (formerly Nexmo) SMS API client
///
/// Sends alert texts through the legacy SMS endpoint, which takes a
/// form-encoded POST and answers with a JSON envelope holding one entry per
/// message part. Status `"0"` means accepted; anything else carries an
/// `error-text`.
///
/// API Documentation: https://developer.vonage.com/en/api/sms

use serde::Deserialize;
use std::time::Duration;

use crate::messaging::MessagingSink;
use crate::model::BinError;

const VONAGE_SMS_URL: &str = "https://rest.nexmo.com/sms/json";

// ============================================================================
// Vonage API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SmsResponse {
    pub messages: Vec<SmsMessageStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SmsMessageStatus {
    pub status: String,
    #[serde(rename = "message-id")]
    pub message_id: Option<String>,
    #[serde(rename = "error-text")]
    pub error_text: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

pub struct VonageSms {
    client: reqwest::blocking::Client,
    api_key: String,
    api_secret: String,
    sender: String,
    endpoint: String,
}

impl VonageSms {
    pub fn new(api_key: &str, api_secret: &str, sender: &str) -> Result<Self, BinError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("binmon_service")
            .build()
            .map_err(|e| BinError::Config(format!("SMS client: {}", e)))?;

        Ok(VonageSms {
            client,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            sender: sender.to_string(),
            endpoint: VONAGE_SMS_URL.to_string(),
        })
    }

    /// Points the client at a different endpoint (sandbox or local stub).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

impl MessagingSink for VonageSms {
    fn send(&self, contact_number: &str, text: &str) -> Result<String, BinError> {
        let params = [
            ("api_key", self.api_key.as_str()),
            ("api_secret", self.api_secret.as_str()),
            ("from", self.sender.as_str()),
            ("to", contact_number),
            ("text", text),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .form(&params)
            .send()
            .map_err(|e| BinError::Sink {
                sink: "sms",
                reason: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(BinError::Sink {
                sink: "sms",
                reason: format!("HTTP error: {}", response.status()),
            });
        }

        let body = response.text().map_err(|e| BinError::Sink {
            sink: "sms",
            reason: format!("unreadable response: {}", e),
        })?;

        parse_send_response(&body)
    }
}

/// Extracts the message id from a send response, or the gateway's error text.
///
/// Only the first message part is inspected; alert texts fit in one part.
pub fn parse_send_response(body: &str) -> Result<String, BinError> {
    let response: SmsResponse = serde_json::from_str(body).map_err(|e| BinError::Sink {
        sink: "sms",
        reason: format!("Parse error: {}", e),
    })?;

    let first = response.messages.into_iter().next().ok_or(BinError::Sink {
        sink: "sms",
        reason: "empty messages array".to_string(),
    })?;

    if first.status == "0" {
        Ok(first.message_id.unwrap_or_default())
    } else {
        Err(BinError::Sink {
            sink: "sms",
            reason: first
                .error_text
                .unwrap_or_else(|| format!("status {}", first.status)),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

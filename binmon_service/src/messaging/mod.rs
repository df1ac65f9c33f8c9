/// Point-to-point messaging to notification recipients.
///
/// The dispatcher only sees the `MessagingSink` capability; which gateway
/// carries the message is a deployment decision.
///
/// Submodules:
/// - `vonage` - SMS over the Vonage (Nexmo) REST API.

pub mod vonage;

use crate::model::{BinError, GpsLocation, Recipient};

/// Sends one text message. Returns the gateway's message id on success.
pub trait MessagingSink: Send + Sync {
    fn send(&self, contact_number: &str, text: &str) -> Result<String, BinError>;
}

/// The alert text sent to one recipient.
pub fn compose_alert(
    recipient: &Recipient,
    bin_id: &str,
    level: u8,
    gps: Option<&GpsLocation>,
) -> String {
    let location = match gps {
        Some(g) => format!("{}, {}", g.latitude, g.longitude),
        None => "unknown".to_string(),
    };
    format!(
        "Alert: Hi {}, Bin {} is {}% full! Location: {}. Please take action.",
        recipient.first_name, bin_id, level, location
    )
}

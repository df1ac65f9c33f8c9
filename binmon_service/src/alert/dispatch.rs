//! Notification fan-out.
//!
//! One qualifying threshold crossing produces one `NotificationEvent`
//! appended to the persistence sink and, when SMS is enabled, one text per
//! recipient with a contact number. Persistence and messaging are attempted
//! independently: a failed append does not stop the texts, and a failed
//! text does not stop the append or the other texts. Nothing is retried;
//! every failure is logged with the bin, the recipient, and the cause.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::logging::{self, Component};
use crate::messaging::{self, MessagingSink};
use crate::model::{BinError, GpsLocation, NotificationEvent, Recipient, Record, Role};
use crate::store::PersistenceSink;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Send SMS alerts in addition to persisting the notification.
    pub sms_enabled: bool,
    /// Only text assigned users; admins see the persisted notification.
    pub sms_users_only: bool,
    /// Upper bound on concurrent SMS sends for one notification.
    pub max_parallel: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            sms_enabled: false,
            sms_users_only: false,
            max_parallel: 4,
        }
    }
}

/// What happened to one dispatch. Failures are already logged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub persisted: bool,
    pub messages_sent: usize,
    pub message_failures: Vec<BinError>,
}

impl DispatchReport {
    pub fn fully_delivered(&self) -> bool {
        self.persisted && self.message_failures.is_empty()
    }
}

pub struct NotificationDispatcher<'a> {
    sink: &'a dyn PersistenceSink,
    messenger: Option<&'a dyn MessagingSink>,
    settings: DispatchSettings,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(
        sink: &'a dyn PersistenceSink,
        messenger: Option<&'a dyn MessagingSink>,
        settings: DispatchSettings,
    ) -> Self {
        NotificationDispatcher {
            sink,
            messenger,
            settings,
        }
    }

    /// Persists one notification for `bin_id` and texts its recipients.
    pub fn dispatch(
        &self,
        bin_id: &str,
        level: u8,
        gps: Option<GpsLocation>,
        recipients: Vec<Recipient>,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let event = NotificationEvent {
            bin_id: bin_id.to_string(),
            level_percent: level,
            gps_location: gps,
            recipients: recipients
                .into_iter()
                .map(|r| Recipient { is_read: false, ..r })
                .collect(),
            fired_at: now,
        };

        let mut report = DispatchReport::default();

        match self.sink.append(&Record::Notification(event.clone())) {
            Ok(()) => {
                report.persisted = true;
                logging::info(
                    Component::Dispatch,
                    Some(bin_id),
                    &format!(
                        "Notification posted: {}% full, {} recipients",
                        level,
                        event.recipients.len()
                    ),
                );
            }
            Err(e) => {
                logging::log_failure(Component::Dispatch, bin_id, "Posting notification", &e)
            }
        }

        if let Some(messenger) = self.messenger.filter(|_| self.settings.sms_enabled) {
            self.send_messages(messenger, &event, &mut report);
        }

        report
    }

    fn send_messages(
        &self,
        messenger: &dyn MessagingSink,
        event: &NotificationEvent,
        report: &mut DispatchReport,
    ) {
        let targets: Vec<(&Recipient, &str)> = event
            .recipients
            .iter()
            .filter(|r| !self.settings.sms_users_only || r.role == Role::User)
            .filter_map(|r| {
                r.contact_number
                    .as_deref()
                    .filter(|n| !n.trim().is_empty())
                    .map(|n| (r, n))
            })
            .collect();

        let chunk_size = self.settings.max_parallel.max(1);
        for chunk in targets.chunks(chunk_size) {
            let results: Vec<Result<String, BinError>> = std::thread::scope(|s| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|&(recipient, number)| {
                        let text = messaging::compose_alert(
                            recipient,
                            &event.bin_id,
                            event.level_percent,
                            event.gps_location.as_ref(),
                        );
                        s.spawn(move || messenger.send(number, &text))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(BinError::Transient("message send panicked".to_string()))
                        })
                    })
                    .collect()
            });

            for (&(recipient, number), result) in chunk.iter().zip(results) {
                match result {
                    Ok(id) => {
                        report.messages_sent += 1;
                        logging::debug(
                            Component::Sms,
                            Some(&event.bin_id),
                            &format!("SMS sent to {} ({}): {}", recipient.user_id, number, id),
                        );
                    }
                    Err(e) => {
                        let err = BinError::Recipient {
                            bin_id: event.bin_id.clone(),
                            user_id: recipient.user_id.clone(),
                            reason: e.to_string(),
                        };
                        logging::log_failure(
                            Component::Sms,
                            &event.bin_id,
                            &format!("SMS to {}", number),
                            &err,
                        );
                        report.message_failures.push(err);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

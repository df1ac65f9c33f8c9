/// Core data types for the trash bin monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// sensor snapshots as they arrive from the feed, the levels and notifications
/// derived from them, the people who receive notifications, and the error
/// taxonomy every stage reports through.
/// It contains no logic beyond small accessors, and no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Collection names
// ---------------------------------------------------------------------------

/// Append-only history of computed fill levels.
pub const COLLECTION_TRASH_LEVELS: &str = "trashLevels";

/// Append-only notification documents read by the notification UI.
pub const COLLECTION_NOTIFICATIONS: &str = "newNotifications";

// ---------------------------------------------------------------------------
// Feed types
// ---------------------------------------------------------------------------

/// GPS fix reported alongside a pre-computed trash level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

/// One bin's node in the realtime feed, exactly as the sensor firmware writes it.
///
/// Two firmware generations exist: raw sensors write `"distance(cm)"`,
/// newer units compute `"trashLevel"` on-device and also report `"gps"`.
/// Either field may be missing or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinSnapshot {
    #[serde(rename = "distance(cm)", default, skip_serializing_if = "Option::is_none")]
    pub distance_cm: Option<f64>,
    #[serde(rename = "trashLevel", default, skip_serializing_if = "Option::is_none")]
    pub trash_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsLocation>,
}

/// A raw distance reading for one bin, stamped with its arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct BinReading {
    pub bin_id: String,
    pub raw_distance_cm: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

/// A fill level the validator accepted as stable. Persisted to `trashLevels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedLevel {
    #[serde(rename = "bin")]
    pub bin_id: String,
    #[serde(rename = "trashLevel")]
    pub level_percent: u8,
    #[serde(rename = "createdAt")]
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// People
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Parses the role column as stored. Unknown roles yield `None` and are
    /// never notified.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered person. `role` is `None` when the stored role is unrecognized.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub contact_number: Option<String>,
    pub role: Option<Role>,
}

/// Which users are assigned to a bin. Only the first matching record is consulted.
#[derive(Debug, Clone, PartialEq)]
pub struct BinAssignment {
    pub bin_id: String,
    pub assignees: Vec<String>,
}

/// A person who receives a notification, as embedded in the notification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub contact_number: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub is_read: bool,
}

impl Recipient {
    pub fn from_user(user: &User, role: Role) -> Self {
        Recipient {
            user_id: user.user_id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            contact_number: user.contact_number.clone(),
            role,
            is_read: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// One qualifying threshold crossing. Immutable once built; written exactly once.
///
/// Field names follow the notification documents the reading UI consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "bin")]
    pub bin_id: String,
    #[serde(rename = "trashLevel")]
    pub level_percent: u8,
    #[serde(rename = "gps")]
    pub gps_location: Option<GpsLocation>,
    pub recipients: Vec<Recipient>,
    #[serde(rename = "datetime")]
    pub fired_at: DateTime<Utc>,
}

/// Anything the persistence sink can append.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Level(ValidatedLevel),
    Notification(NotificationEvent),
}

impl Record {
    /// The collection this record is appended to.
    pub fn collection(&self) -> &'static str {
        match self {
            Record::Level(_) => COLLECTION_TRASH_LEVELS,
            Record::Notification(_) => COLLECTION_NOTIFICATIONS,
        }
    }

    pub fn bin_id(&self) -> &str {
        match self {
            Record::Level(l) => &l.bin_id,
            Record::Notification(n) => &n.bin_id,
        }
    }

    /// The record as a JSON document.
    pub fn to_document(&self) -> serde_json::Value {
        let doc = match self {
            Record::Level(l) => serde_json::to_value(l),
            Record::Notification(n) => serde_json::to_value(n),
        };
        // Both payloads are plain structs of strings and numbers.
        doc.unwrap_or(serde_json::Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise anywhere between the feed and the sinks.
///
/// None of these ever escape the pipeline; they are logged and folded into
/// a `PipelineOutcome`.
#[derive(Debug, Clone, PartialEq)]
pub enum BinError {
    /// A store or the feed is temporarily unreachable. Skip this cycle.
    Transient(String),
    /// An expected snapshot field is absent or unusable. No signal this cycle.
    MissingData { bin_id: String, field: &'static str },
    /// Delivery to a single recipient failed.
    Recipient {
        bin_id: String,
        user_id: String,
        reason: String,
    },
    /// A persistence or messaging call failed.
    Sink { sink: &'static str, reason: String },
    /// Configuration could not be loaded. Startup only.
    Config(String),
}

impl std::fmt::Display for BinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinError::Transient(msg) => write!(f, "Transient error: {}", msg),
            BinError::MissingData { bin_id, field } => {
                write!(f, "Missing data for bin {}: {}", bin_id, field)
            }
            BinError::Recipient {
                bin_id,
                user_id,
                reason,
            } => write!(
                f,
                "Delivery to {} for bin {} failed: {}",
                user_id, bin_id, reason
            ),
            BinError::Sink { sink, reason } => write!(f, "{} sink failed: {}", sink, reason),
            BinError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for BinError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

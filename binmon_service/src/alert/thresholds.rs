//! Critical fill level checking.
//!
//! A bin is notification-worthy when its level is exactly one of the
//! critical levels. Levels in between (91-94, 96-99) never fire; this is how
//! the deployed firmware and notification UI have always agreed on what
//! "critical" means, so it is preserved as-is.
//!
//! The default gate is stateless: every cycle that reproduces a critical
//! level fires again. `GateMode::OnChange` adds a per-bin memory of the last
//! notified level for deployments that want one notification per crossing.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;

/// Fill levels that trigger a notification.
pub const CRITICAL_LEVELS: [u8; 3] = [90, 95, 100];

/// Returns `true` only for exact members of `CRITICAL_LEVELS`.
pub fn should_notify(level: u8) -> bool {
    CRITICAL_LEVELS.contains(&level)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Fire on every cycle whose level is critical.
    #[default]
    EveryCycle,
    /// Fire only when a bin moves into a critical level it was not last notified at.
    OnChange,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub mode: GateMode,
}

pub struct ThresholdGate {
    mode: GateMode,
    last_notified: Mutex<HashMap<String, u8>>,
}

impl ThresholdGate {
    pub fn new(mode: GateMode) -> Self {
        ThresholdGate {
            mode,
            last_notified: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Decides whether `level` on `bin_id` fires a notification this cycle.
    pub fn evaluate(&self, bin_id: &str, level: u8) -> bool {
        match self.mode {
            GateMode::EveryCycle => should_notify(level),
            GateMode::OnChange => {
                let mut last = self
                    .last_notified
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if !should_notify(level) {
                    // Leaving the critical set re-arms the gate.
                    last.remove(bin_id);
                    return false;
                }
                if last.get(bin_id) == Some(&level) {
                    return false;
                }
                last.insert(bin_id.to_string(), level);
                true
            }
        }
    }
}

impl Default for ThresholdGate {
    fn default() -> Self {
        ThresholdGate::new(GateMode::EveryCycle)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

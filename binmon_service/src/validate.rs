/// Sliding-window validation of raw distance readings.
///
/// Ultrasonic sensors in a bin bounce off lids, hands, and falling bags, so a
/// single reading cannot be trusted. Each bin gets a short trailing window of
/// recent readings; a distance is only accepted once enough readings inside
/// the window agree within a fixed deviation bound.
///
/// # Ownership
/// The per-bin windows live in one `ReadingValidator` instance which the
/// pipeline owns. Each window has its own lock, so readings for the same bin
/// are applied one at a time while different bins never contend beyond a
/// brief map lookup.
///
/// # Clock injection
/// `validate` takes `now` rather than reading the clock, which keeps window
/// pruning deterministic in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Readings older than this, relative to the newest, fall out of the window.
pub const WINDOW_SPAN_MS: i64 = 3_000;

/// Largest spread (max - min) between readings in the window that still
/// counts as agreement.
pub const MAX_DEVIATION_CM: f64 = 5.0;

/// A window needs at least this many readings before anything is accepted.
pub const MIN_SAMPLES: usize = 2;

/// Windows with no reading for this long are evicted by `sweep_inactive`.
pub const INACTIVE_TTL_SECS: i64 = 600;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    pub window_span_ms: i64,
    pub max_deviation_cm: f64,
    pub min_samples: usize,
    pub inactive_ttl_secs: i64,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        ValidatorSettings {
            window_span_ms: WINDOW_SPAN_MS,
            max_deviation_cm: MAX_DEVIATION_CM,
            min_samples: MIN_SAMPLES,
            inactive_ttl_secs: INACTIVE_TTL_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Reading window
// ---------------------------------------------------------------------------

/// Recent `(distance, arrival time)` pairs for one bin, oldest first.
#[derive(Debug, Default)]
struct ReadingWindow {
    entries: VecDeque<(f64, DateTime<Utc>)>,
}

impl ReadingWindow {
    /// Appends a reading and drops every entry older than `span` relative to `now`.
    ///
    /// An entry whose age equals the span is kept.
    fn push(&mut self, distance_cm: f64, now: DateTime<Utc>, span: Duration) {
        self.entries.push_back((distance_cm, now));
        while let Some(&(_, at)) = self.entries.front() {
            if now - at > span {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Max minus min of the distances currently held.
    fn spread(&self) -> f64 {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &(d, _) in &self.entries {
            min = min.min(d);
            max = max.max(d);
        }
        max - min
    }

    fn newest(&self) -> Option<&(f64, DateTime<Utc>)> {
        self.entries.back()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

pub struct ReadingValidator {
    settings: ValidatorSettings,
    windows: Mutex<HashMap<String, Arc<Mutex<ReadingWindow>>>>,
}

impl ReadingValidator {
    pub fn new(settings: ValidatorSettings) -> Self {
        ReadingValidator {
            settings,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    /// Records a reading for `bin_id` and returns it if the window now agrees.
    ///
    /// Returns `None` while the window holds fewer than `min_samples`
    /// readings or their spread exceeds `max_deviation_cm`. A lone reading
    /// is never accepted. A non-finite distance is not a reading: it is
    /// dropped without touching the window.
    pub fn validate(&self, bin_id: &str, distance_cm: f64, now: DateTime<Utc>) -> Option<f64> {
        if !distance_cm.is_finite() {
            return None;
        }
        let window = self.window_for(bin_id);
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);

        window.push(
            distance_cm,
            now,
            Duration::milliseconds(self.settings.window_span_ms),
        );

        if window.len() < self.settings.min_samples {
            return None;
        }
        if window.spread() > self.settings.max_deviation_cm {
            return None;
        }
        window.newest().map(|&(d, _)| d)
    }

    /// Evicts windows whose newest reading is older than the inactivity TTL.
    /// Returns how many were removed.
    pub fn sweep_inactive(&self, now: DateTime<Utc>) -> usize {
        // Out-of-range TTLs are rejected by config checks; treat one as "never".
        let ttl = Duration::try_seconds(self.settings.inactive_ttl_secs).unwrap_or(Duration::MAX);
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, window| {
            let window = window.lock().unwrap_or_else(PoisonError::into_inner);
            match window.newest() {
                Some(&(_, at)) => now - at <= ttl,
                None => false,
            }
        });
        before - windows.len()
    }

    /// Number of bins currently holding a window.
    pub fn tracked_bins(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn window_for(&self, bin_id: &str) -> Arc<Mutex<ReadingWindow>> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(windows.entry(bin_id.to_string()).or_default())
    }
}

impl Default for ReadingValidator {
    fn default() -> Self {
        ReadingValidator::new(ValidatorSettings::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

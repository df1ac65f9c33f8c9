/// The per-bin update pipeline.
///
/// One snapshot from the feed runs through:
///
/// ```text
/// snapshot ─┬─ trashLevel ──────────────────────────────┐
///           └─ distance(cm) ─ validate ─ level ─ history ─┴─ gate ─ resolve ─ dispatch
/// ```
///
/// Sensors that already report a level skip validation and level
/// computation entirely. Everything that can fail is logged and folded into
/// the returned `PipelineOutcome`; `handle_update` never panics on bad input
/// and never returns an error, so the feed loop stays alive.
///
/// # Concurrency
/// `process_batch` runs different bins in parallel, bounded by
/// `max_parallel_bins`; recipient lookups within one bin are bounded by
/// `max_parallel_lookups`. A batch holds at most one snapshot per bin, and
/// batches run one after another, so each bin's readings reach its window in
/// arrival order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::alert::dispatch::{DispatchReport, DispatchSettings, NotificationDispatcher};
use crate::alert::recipients::RecipientResolver;
use crate::alert::thresholds::ThresholdGate;
use crate::level::compute_level;
use crate::logging::{self, Component};
use crate::messaging::MessagingSink;
use crate::model::{BinError, BinReading, BinSnapshot, GpsLocation, Record, ValidatedLevel};
use crate::store::{AssignmentStore, PersistenceSink, UserStore};
use crate::validate::ReadingValidator;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Upper bound on bins processed concurrently within one feed cycle.
    pub max_parallel_bins: usize,
    /// Upper bound on concurrent assignee lookups while resolving one bin.
    pub max_parallel_lookups: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            max_parallel_bins: 8,
            max_parallel_lookups: 4,
        }
    }
}

/// What one snapshot led to.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The snapshot carried no usable level or distance.
    NoSignal(BinError),
    /// A distance was recorded but the window does not agree yet.
    Unstable,
    /// A level was established but is not critical.
    BelowThreshold { level: u8 },
    /// A critical level fired a notification.
    Notified { level: u8, report: DispatchReport },
}

impl PipelineOutcome {
    pub fn level(&self) -> Option<u8> {
        match self {
            PipelineOutcome::BelowThreshold { level } | PipelineOutcome::Notified { level, .. } => {
                Some(*level)
            }
            _ => None,
        }
    }

    pub fn notified(&self) -> bool {
        matches!(self, PipelineOutcome::Notified { .. })
    }
}

pub struct Pipeline {
    validator: ReadingValidator,
    gate: ThresholdGate,
    users: Arc<dyn UserStore>,
    assignments: Arc<dyn AssignmentStore>,
    sink: Arc<dyn PersistenceSink>,
    messenger: Option<Arc<dyn MessagingSink>>,
    dispatch_settings: DispatchSettings,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        validator: ReadingValidator,
        gate: ThresholdGate,
        users: Arc<dyn UserStore>,
        assignments: Arc<dyn AssignmentStore>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Pipeline {
            validator,
            gate,
            users,
            assignments,
            sink,
            messenger: None,
            dispatch_settings: DispatchSettings::default(),
            settings: PipelineSettings::default(),
        }
    }

    /// A pipeline whose users, assignments, and persistence all live in `store`.
    pub fn with_store<S>(validator: ReadingValidator, gate: ThresholdGate, store: Arc<S>) -> Self
    where
        S: UserStore + AssignmentStore + PersistenceSink + 'static,
    {
        let users: Arc<dyn UserStore> = store.clone();
        let assignments: Arc<dyn AssignmentStore> = store.clone();
        let sink: Arc<dyn PersistenceSink> = store;
        Pipeline::new(validator, gate, users, assignments, sink)
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn MessagingSink>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    pub fn with_dispatch_settings(mut self, settings: DispatchSettings) -> Self {
        self.dispatch_settings = settings;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runs one bin's snapshot through the whole pipeline.
    pub fn handle_update(
        &self,
        bin_id: &str,
        snapshot: &BinSnapshot,
        now: DateTime<Utc>,
    ) -> PipelineOutcome {
        let level = match self.establish_level(bin_id, snapshot, now) {
            Ok(Some(level)) => level,
            Ok(None) => return PipelineOutcome::Unstable,
            Err(e) => {
                logging::debug(Component::Source, Some(bin_id), &e.to_string());
                return PipelineOutcome::NoSignal(e);
            }
        };

        logging::debug(
            Component::Gate,
            Some(bin_id),
            &format!("Trash level: {}%", level),
        );

        if !self.gate.evaluate(bin_id, level) {
            return PipelineOutcome::BelowThreshold { level };
        }

        let report = self.notify(bin_id, level, snapshot.gps, now);
        PipelineOutcome::Notified { level, report }
    }

    /// Runs a raw reading (no GPS, no pre-computed level) through the pipeline.
    pub fn handle_reading(&self, reading: &BinReading) -> PipelineOutcome {
        let snapshot = BinSnapshot {
            distance_cm: reading.raw_distance_cm,
            ..BinSnapshot::default()
        };
        self.handle_update(&reading.bin_id, &snapshot, reading.observed_at)
    }

    /// Runs one feed cycle: every bin's snapshot, bins in parallel.
    ///
    /// Outcomes are returned in input order.
    pub fn process_batch(
        &self,
        snapshots: &[(String, BinSnapshot)],
        now: DateTime<Utc>,
    ) -> Vec<(String, PipelineOutcome)> {
        let mut outcomes = Vec::with_capacity(snapshots.len());

        for chunk in snapshots.chunks(self.settings.max_parallel_bins.max(1)) {
            let results: Vec<PipelineOutcome> = std::thread::scope(|s| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|(bin_id, snapshot)| {
                        s.spawn(move || self.handle_update(bin_id, snapshot, now))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            PipelineOutcome::NoSignal(BinError::Transient(
                                "bin update panicked".to_string(),
                            ))
                        })
                    })
                    .collect()
            });
            outcomes.extend(chunk.iter().map(|(bin_id, _)| bin_id.clone()).zip(results));
        }

        let notified = outcomes.iter().filter(|(_, o)| o.notified()).count();
        let failed = outcomes
            .iter()
            .filter(|(_, o)| match o {
                PipelineOutcome::Notified { report, .. } => !report.fully_delivered(),
                PipelineOutcome::NoSignal(BinError::Transient(_)) => true,
                _ => false,
            })
            .count();
        logging::log_cycle_summary(outcomes.len(), notified, failed);

        outcomes
    }

    /// Drops reading windows for bins that have gone quiet.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let removed = self.validator.sweep_inactive(now);
        if removed > 0 {
            logging::info(
                Component::Validator,
                None,
                &format!(
                    "Evicted {} bin windows idle for over {}s",
                    removed,
                    self.validator.settings().inactive_ttl_secs
                ),
            );
        }
        removed
    }

    /// `Ok(None)` while a raw reading is still unstable.
    fn establish_level(
        &self,
        bin_id: &str,
        snapshot: &BinSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Option<u8>, BinError> {
        if let Some(reported) = snapshot.trash_level {
            return reported_level(reported)
                .map(Some)
                .ok_or_else(|| missing(bin_id, "trashLevel"));
        }

        let distance = snapshot
            .distance_cm
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| missing(bin_id, "distance(cm)"))?;

        let Some(stable) = self.validator.validate(bin_id, distance, now) else {
            logging::debug(
                Component::Validator,
                Some(bin_id),
                &format!("Reading {} cm not yet stable", distance),
            );
            return Ok(None);
        };

        let level = compute_level(stable);
        self.record_level(bin_id, level, now);
        Ok(Some(level))
    }

    fn record_level(&self, bin_id: &str, level: u8, now: DateTime<Utc>) {
        let record = Record::Level(ValidatedLevel {
            bin_id: bin_id.to_string(),
            level_percent: level,
            computed_at: now,
        });
        if let Err(e) = self.sink.append(&record) {
            logging::log_failure(Component::Database, bin_id, "Recording trash level", &e);
        }
    }

    fn notify(
        &self,
        bin_id: &str,
        level: u8,
        gps: Option<GpsLocation>,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let recipients = RecipientResolver::new(self.users.as_ref(), self.assignments.as_ref())
            .with_max_parallel(self.settings.max_parallel_lookups)
            .resolve(bin_id);
        if recipients.is_empty() {
            logging::warn(
                Component::Resolver,
                Some(bin_id),
                "No recipients resolved; notification will have no recipients",
            );
        }

        NotificationDispatcher::new(
            self.sink.as_ref(),
            self.messenger.as_deref(),
            self.dispatch_settings.clone(),
        )
        .dispatch(bin_id, level, gps, recipients, now)
    }
}

fn missing(bin_id: &str, field: &'static str) -> BinError {
    BinError::MissingData {
        bin_id: bin_id.to_string(),
        field,
    }
}

/// A device-reported level is usable only as a whole number in `0..=100`.
fn reported_level(value: f64) -> Option<u8> {
    if value.is_finite() && value.fract() == 0.0 && (0.0..=100.0).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

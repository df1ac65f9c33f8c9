/// Simulated sensor readings for development and field checks.
///
/// When no physical sensor is at hand, use this module to replay a
/// sequence of distances, either straight into an in-process pipeline (with
/// synthetic timestamps) or into the realtime feed so a running daemon
/// picks them up exactly as it would from a real bin.

use chrono::{DateTime, Duration, Utc};

use crate::ingest::realtime::RealtimeFeed;
use crate::logging::{self, Component};
use crate::model::{BinError, BinReading};
use crate::pipeline::{Pipeline, PipelineOutcome};

/// Configuration for one simulated sensor
pub struct Simulation {
    pub bin_id: String,
    /// Distances written in order, one per interval
    pub distances_cm: Vec<f64>,
    /// Gap between writes in milliseconds (default: 1000)
    pub interval_ms: i64,
}

impl Simulation {
    /// Create a new simulation for `bin_id`
    pub fn new(bin_id: &str, distances_cm: Vec<f64>) -> Self {
        Self {
            bin_id: bin_id.to_string(),
            distances_cm,
            interval_ms: 1_000,
        }
    }

    /// Three readings a second apart, settling within the deviation bound
    pub fn field_check(bin_id: &str) -> Self {
        Self::new(bin_id, vec![14.0, 15.0, 16.0])
    }

    /// The readings this simulation produces, stamped from `start`
    pub fn readings(&self, start: DateTime<Utc>) -> Vec<BinReading> {
        self.distances_cm
            .iter()
            .enumerate()
            .map(|(i, &d)| BinReading {
                bin_id: self.bin_id.clone(),
                raw_distance_cm: Some(d),
                observed_at: start + Duration::milliseconds(self.interval_ms * i as i64),
            })
            .collect()
    }

    /// Feeds every reading through `pipeline` without sleeping
    ///
    /// Returns one outcome per reading, in order.
    pub fn replay(&self, pipeline: &Pipeline, start: DateTime<Utc>) -> Vec<PipelineOutcome> {
        self.readings(start)
            .iter()
            .map(|reading| pipeline.handle_reading(reading))
            .collect()
    }

    /// Writes each distance to the feed in real time
    ///
    /// Returns how many writes succeeded. A failed write is logged and the
    /// simulation carries on with the next distance.
    pub fn push_to_feed(&self, feed: &RealtimeFeed) -> Result<usize, BinError> {
        let interval = std::time::Duration::from_millis(self.interval_ms.max(0) as u64);
        let mut written = 0;

        for (i, &distance) in self.distances_cm.iter().enumerate() {
            if i > 0 {
                std::thread::sleep(interval);
            }
            match feed.push_distance(&self.bin_id, distance) {
                Ok(()) => {
                    written += 1;
                    logging::info(
                        Component::Source,
                        Some(&self.bin_id),
                        &format!("Updated distance to {}cm", distance),
                    );
                }
                Err(e) => {
                    logging::log_failure(Component::Source, &self.bin_id, "Updating distance", &e)
                }
            }
        }

        if written == 0 && !self.distances_cm.is_empty() {
            return Err(BinError::Transient(format!(
                "no simulated readings reached the feed for {}",
                self.bin_id
            )));
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::thresholds::ThresholdGate;
    use crate::store::memory::MemoryStore;
    use crate::validate::ReadingValidator;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_simulation_creation() {
        let sim = Simulation::field_check("Quiboloy");
        assert_eq!(sim.bin_id, "Quiboloy");
        assert_eq!(sim.distances_cm, vec![14.0, 15.0, 16.0]);
        assert_eq!(sim.interval_ms, 1_000);
    }

    #[test]
    fn test_readings_are_spaced_by_interval() {
        let mut sim = Simulation::new("B1", vec![10.0, 20.0, 30.0]);
        sim.interval_ms = 250;
        let readings = sim.readings(t0());
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[2].observed_at, t0() + Duration::milliseconds(500));
        assert_eq!(readings[1].raw_distance_cm, Some(20.0));
    }

    #[test]
    fn test_replay_field_check() {
        let store = Arc::new(MemoryStore::new());
        let pipeline =
            Pipeline::with_store(ReadingValidator::default(), ThresholdGate::default(), store);
        let outcomes = Simulation::field_check("Quiboloy").replay(&pipeline, t0());
        assert_eq!(outcomes[0], PipelineOutcome::Unstable);
        assert_eq!(outcomes[2], PipelineOutcome::BelowThreshold { level: 86 });
    }
}

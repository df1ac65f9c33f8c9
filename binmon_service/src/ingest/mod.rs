/// Sensor feed ingestion.
///
/// The pipeline consumes bin snapshots through the `BinDataSource`
/// capability. A source reports the whole feed every time it is polled;
/// `watch` turns that into per-bin change events (one per sensor write)
/// and keeps going through every failure the source can report.
///
/// Submodules:
/// - `realtime` - REST client for the realtime database the sensors write to.

pub mod realtime;

use std::collections::HashMap;
use std::time::Duration;

use crate::logging::{self, Component};
use crate::model::{BinError, BinSnapshot};

/// A live feed of per-bin sensor snapshots.
pub trait BinDataSource {
    /// The current snapshot of every bin the feed knows about.
    fn poll(&self) -> Result<Vec<(String, BinSnapshot)>, BinError>;
}

/// Last snapshot seen per bin.
///
/// A snapshot that sits unchanged in the feed is the same sensor write, so
/// it must reach the pipeline once, not once per poll.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last_seen: HashMap<String, BinSnapshot>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only the bins whose snapshot differs from the previous poll.
    ///
    /// Bins missing from `snapshots` are forgotten, so a bin that is removed
    /// and later rewritten with the same value counts as changed again.
    pub fn changed(
        &mut self,
        snapshots: Vec<(String, BinSnapshot)>,
    ) -> Vec<(String, BinSnapshot)> {
        let mut seen = HashMap::with_capacity(snapshots.len());
        let mut changed = Vec::new();

        for (bin_id, snapshot) in snapshots {
            if self.last_seen.get(&bin_id) != Some(&snapshot) {
                changed.push((bin_id.clone(), snapshot.clone()));
            }
            seen.insert(bin_id, snapshot);
        }

        self.last_seen = seen;
        changed
    }
}

/// Polls `source` every `interval` and hands each tick's changed snapshots
/// to `on_tick` until `on_tick` returns `false`.
///
/// `on_tick` runs on every successful poll, with an empty batch when no bin
/// changed. A failed poll is logged and the tick skipped; the loop never
/// exits on a source error.
pub fn watch<S, F>(source: &S, interval: Duration, mut on_tick: F)
where
    S: BinDataSource + ?Sized,
    F: FnMut(Vec<(String, BinSnapshot)>) -> bool,
{
    let mut tracker = ChangeTracker::new();
    loop {
        let keep_going = match source.poll() {
            Ok(snapshots) => on_tick(tracker.changed(snapshots)),
            Err(e) => {
                logging::warn(
                    Component::Source,
                    None,
                    &format!("Feed poll failed, skipping cycle: {}", e),
                );
                true
            }
        };
        if !keep_going {
            return;
        }
        std::thread::sleep(interval);
    }
}

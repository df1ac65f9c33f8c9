/// End-to-end pipeline scenarios against the in-memory store
///
/// These tests verify:
/// 1. Raw distance readings are validated before a level is acted upon
/// 2. Pre-computed levels bypass validation and notify the resolved recipients
/// 3. Repeated qualifying levels notify again (no deduplication)
/// 4. Messaging failures are isolated per recipient
/// 5. Many bins can be processed per cycle without cross-talk
/// 6. A value sitting unchanged in the feed is one reading, not one per poll
///
/// No database or network access is needed.
///
/// Run with: cargo test --test pipeline_scenarios

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use binmon_service::alert::dispatch::DispatchSettings;
use binmon_service::alert::recipients::resolve_recipients;
use binmon_service::alert::thresholds::ThresholdGate;
use binmon_service::ingest::{watch, BinDataSource};
use binmon_service::messaging::MessagingSink;
use binmon_service::model::{
    BinError, BinSnapshot, GpsLocation, Record, Role, User, COLLECTION_NOTIFICATIONS,
    COLLECTION_TRASH_LEVELS,
};
use binmon_service::pipeline::{Pipeline, PipelineOutcome, PipelineSettings};
use binmon_service::simulate::Simulation;
use binmon_service::store::memory::MemoryStore;
use binmon_service::validate::ReadingValidator;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
}

fn user(id: &str, role: Role, number: Option<&str>) -> User {
    User {
        user_id: id.to_string(),
        first_name: format!("{}-first", id),
        last_name: format!("{}-last", id),
        contact_number: number.map(String::from),
        role: Some(role),
    }
}

/// Two admins, two field users, and an assignment for B2 that also lists
/// a deleted user and an admin.
fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_user(user("admin-1", Role::Admin, Some("+639170000001")));
    store.add_user(user("admin-2", Role::Admin, None));
    store.add_user(user("user-1", Role::User, Some("+639170000011")));
    store.add_user(user("user-2", Role::User, Some("+639170000012")));
    store.add_assignment("B2", &["user-1", "deleted-user", "admin-2", "user-2"]);
    store
}

fn pipeline(store: &Arc<MemoryStore>) -> Pipeline {
    Pipeline::with_store(ReadingValidator::default(), ThresholdGate::default(), store.clone())
}

fn reported(level: f64) -> BinSnapshot {
    BinSnapshot {
        distance_cm: None,
        trash_level: Some(level),
        gps: Some(GpsLocation {
            latitude: 14.5995,
            longitude: 120.9842,
            altitude: 7.0,
        }),
    }
}

fn raw(distance: f64) -> BinSnapshot {
    BinSnapshot {
        distance_cm: Some(distance),
        ..BinSnapshot::default()
    }
}

fn notifications(store: &MemoryStore) -> Vec<binmon_service::model::NotificationEvent> {
    store
        .records_in(COLLECTION_NOTIFICATIONS)
        .into_iter()
        .filter_map(|r| match r {
            Record::Notification(n) => Some(n),
            Record::Level(_) => None,
        })
        .collect()
}

#[derive(Default)]
struct RecordingSms {
    sent: Mutex<Vec<String>>,
    reject: Option<String>,
}

impl MessagingSink for RecordingSms {
    fn send(&self, contact_number: &str, _text: &str) -> Result<String, BinError> {
        if self.reject.as_deref() == Some(contact_number) {
            return Err(BinError::Sink {
                sink: "sms",
                reason: "Non-White-listed Destination".to_string(),
            });
        }
        self.sent.lock().unwrap().push(contact_number.to_string());
        Ok("msg".to_string())
    }
}

// ---------------------------------------------------------------------------
// 1. Raw readings
// ---------------------------------------------------------------------------

#[test]
fn test_field_check_readings_settle_below_threshold() {
    // Bin B1 sends 14, 15, 16 cm one second apart.
    let store = seeded_store();
    let p = pipeline(&store);

    let outcomes: Vec<_> = [(14.0, 0), (15.0, 1_000), (16.0, 2_000)]
        .iter()
        .map(|&(d, ms)| p.handle_update("B1", &raw(d), t0() + Duration::milliseconds(ms)))
        .collect();

    assert_eq!(outcomes[0], PipelineOutcome::Unstable, "a lone reading never validates");
    assert_eq!(outcomes[2], PipelineOutcome::BelowThreshold { level: 86 });
    assert!(notifications(&store).is_empty(), "86% must not notify");
}

#[test]
fn test_simulated_field_check_matches_manual_replay() {
    let store = seeded_store();
    let p = pipeline(&store);
    let outcomes = Simulation::field_check("B1").replay(&p, t0());
    assert_eq!(outcomes.last(), Some(&PipelineOutcome::BelowThreshold { level: 86 }));
    // Readings 2 and 3 were both accepted and recorded.
    assert_eq!(store.records_in(COLLECTION_TRASH_LEVELS).len(), 2);
}

#[test]
fn test_noisy_sensor_never_notifies() {
    // Alternating readings 10 cm apart never agree, even though some of
    // them alone would map to a critical level.
    let store = seeded_store();
    let p = pipeline(&store);
    for i in 0..10 {
        let d = if i % 2 == 0 { 2.0 } else { 12.0 };
        let outcome = p.handle_update("B3", &raw(d), t0() + Duration::milliseconds(500 * i));
        assert_eq!(outcome, PipelineOutcome::Unstable);
    }
    assert!(store.records().is_empty());
}

#[test]
fn test_stable_full_bin_notifies_from_raw_readings() {
    let store = seeded_store();
    let p = pipeline(&store);
    p.handle_update("B2", &raw(1.5), t0());
    let outcome = p.handle_update("B2", &raw(2.0), t0() + Duration::seconds(1));
    assert!(outcome.notified());
    assert_eq!(outcome.level(), Some(100));

    let events = notifications(&store);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].gps_location, None, "raw sensors report no GPS");
}

// ---------------------------------------------------------------------------
// 2. Pre-computed levels
// ---------------------------------------------------------------------------

#[test]
fn test_reported_critical_level_notifies_resolved_recipients() {
    let store = seeded_store();
    let p = pipeline(&store);

    let outcome = p.handle_update("B2", &reported(95.0), t0());
    assert!(outcome.notified());

    let events = notifications(&store);
    assert_eq!(events.len(), 1, "dispatcher runs exactly once");
    let event = &events[0];
    assert_eq!(event.bin_id, "B2");
    assert_eq!(event.level_percent, 95);
    assert_eq!(event.gps_location.map(|g| g.longitude), Some(120.9842));
    assert_eq!(event.recipients, resolve_recipients(store.as_ref(), store.as_ref(), "B2"));
}

#[test]
fn test_recipients_are_admins_then_valid_assignees() {
    let store = seeded_store();
    let recipients = resolve_recipients(store.as_ref(), store.as_ref(), "B2");
    let ids: Vec<_> = recipients.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(ids, ["admin-1", "admin-2", "user-1", "user-2"]);
    let roles: Vec<_> = recipients.iter().map(|r| r.role).collect();
    assert_eq!(roles, [Role::Admin, Role::Admin, Role::User, Role::User]);
}

#[test]
fn test_non_critical_reported_levels_are_silent() {
    let store = seeded_store();
    let p = pipeline(&store);
    for level in [0.0, 50.0, 89.0, 91.0, 94.0, 96.0, 99.0] {
        let outcome = p.handle_update("B2", &reported(level), t0());
        assert_eq!(outcome, PipelineOutcome::BelowThreshold { level: level as u8 });
    }
    assert!(notifications(&store).is_empty());
}

// ---------------------------------------------------------------------------
// 3. No deduplication
// ---------------------------------------------------------------------------

#[test]
fn test_same_qualifying_level_twice_notifies_twice() {
    // Re-notifying on every cycle is the documented default behaviour.
    let store = seeded_store();
    let p = pipeline(&store);

    assert!(p.handle_update("B2", &reported(90.0), t0()).notified());
    assert!(p.handle_update("B2", &reported(90.0), t0() + Duration::seconds(1)).notified());

    let events = notifications(&store);
    assert_eq!(events.len(), 2, "two cycles at 90% produce two notifications");
    assert_eq!(events[0].level_percent, events[1].level_percent);
    assert_ne!(events[0].fired_at, events[1].fired_at);
}

// ---------------------------------------------------------------------------
// 4. Messaging
// ---------------------------------------------------------------------------

#[test]
fn test_rejected_number_does_not_block_other_recipients() {
    let store = seeded_store();
    let sms = Arc::new(RecordingSms {
        reject: Some("+639170000011".to_string()),
        ..RecordingSms::default()
    });
    let p = pipeline(&store)
        .with_messenger(sms.clone())
        .with_dispatch_settings(DispatchSettings {
            sms_enabled: true,
            ..DispatchSettings::default()
        });

    let outcome = p.handle_update("B2", &reported(100.0), t0());
    let PipelineOutcome::Notified { report, .. } = outcome else {
        panic!("expected a notification");
    };
    assert!(report.persisted);
    // admin-1 and user-2 have working numbers, admin-2 has none, user-1 is rejected.
    assert_eq!(report.messages_sent, 2);
    assert_eq!(report.message_failures.len(), 1);

    let mut sent = sms.sent.lock().unwrap().clone();
    sent.sort();
    assert_eq!(sent, ["+639170000001", "+639170000012"]);
}

#[test]
fn test_storage_outage_still_texts_nobody_but_keeps_running() {
    // With reads failing, recipients resolve to nothing; the notification
    // is still attempted and nothing panics.
    let store = seeded_store();
    store.set_fail_reads(true);
    store.set_fail_appends(true);
    let sms = Arc::new(RecordingSms::default());
    let p = pipeline(&store)
        .with_messenger(sms.clone())
        .with_dispatch_settings(DispatchSettings {
            sms_enabled: true,
            ..DispatchSettings::default()
        });

    let outcome = p.handle_update("B2", &reported(95.0), t0());
    let PipelineOutcome::Notified { report, .. } = outcome else {
        panic!("expected a notification attempt");
    };
    assert!(!report.persisted);
    assert_eq!(report.messages_sent, 0);
    assert!(sms.sent.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// 5. Many bins
// ---------------------------------------------------------------------------

#[test]
fn test_many_bins_over_several_cycles() {
    let store = seeded_store();
    let p = pipeline(&store).with_settings(PipelineSettings {
        max_parallel_bins: 3,
        ..PipelineSettings::default()
    });

    // Twenty raw-sensor bins, each writing 11.8 cm then 12.0 cm (both 90%).
    let cycle = |d: f64| -> Vec<(String, BinSnapshot)> {
        (0..20).map(|i| (format!("bin-{:02}", i), raw(d))).collect()
    };

    let first = p.process_batch(&cycle(11.8), t0());
    assert!(first.iter().all(|(_, o)| *o == PipelineOutcome::Unstable));

    let second = p.process_batch(&cycle(12.0), t0() + Duration::seconds(1));
    assert!(second.iter().all(|(_, o)| o.level() == Some(90) && o.notified()));
    assert_eq!(notifications(&store).len(), 20);
    assert_eq!(store.records_in(COLLECTION_TRASH_LEVELS).len(), 20);

    let mut bins: Vec<_> = notifications(&store).into_iter().map(|n| n.bin_id).collect();
    bins.sort();
    bins.dedup();
    assert_eq!(bins.len(), 20, "each bin notified exactly once this cycle");
}

// ---------------------------------------------------------------------------
// 6. Polled feed
// ---------------------------------------------------------------------------

/// Serves one feed tree per poll, repeating the last one forever.
struct ScriptedFeed {
    trees: Vec<Vec<(String, BinSnapshot)>>,
    polls: Cell<usize>,
}

impl ScriptedFeed {
    fn new(trees: Vec<Vec<(String, BinSnapshot)>>) -> Self {
        ScriptedFeed {
            trees,
            polls: Cell::new(0),
        }
    }
}

impl BinDataSource for ScriptedFeed {
    fn poll(&self) -> Result<Vec<(String, BinSnapshot)>, BinError> {
        let n = self.polls.get();
        self.polls.set(n + 1);
        Ok(self.trees[n.min(self.trees.len() - 1)].clone())
    }
}

/// Runs `ticks` feed cycles one second apart, the way the daemon does.
fn run_feed(p: &Pipeline, feed: &ScriptedFeed, ticks: usize) -> Vec<(String, PipelineOutcome)> {
    let mut outcomes = Vec::new();
    let mut tick = 0;
    watch(feed, std::time::Duration::ZERO, |changed| {
        let now = t0() + Duration::seconds(tick as i64);
        outcomes.extend(p.process_batch(&changed, now));
        tick += 1;
        tick < ticks
    });
    outcomes
}

#[test]
fn test_stale_feed_value_is_a_single_reading() {
    // One sensor write of 2 cm, then nothing new for five polls.
    let store = seeded_store();
    let p = pipeline(&store);
    let feed = ScriptedFeed::new(vec![vec![("B9".to_string(), raw(2.0))]]);

    let outcomes = run_feed(&p, &feed, 5);

    assert_eq!(feed.polls.get(), 5);
    assert_eq!(outcomes.len(), 1, "one write reaches the pipeline once");
    assert_eq!(outcomes[0].1, PipelineOutcome::Unstable);
    assert!(notifications(&store).is_empty());
    assert!(store.records_in(COLLECTION_TRASH_LEVELS).is_empty());
}

#[test]
fn test_stale_critical_level_notifies_once() {
    // Two agreeing writes, then the value sits in the feed.
    let store = seeded_store();
    let p = pipeline(&store);
    let feed = ScriptedFeed::new(vec![
        vec![("B9".to_string(), raw(2.0))],
        vec![("B9".to_string(), raw(2.5))],
    ]);

    let outcomes = run_feed(&p, &feed, 6);

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[1].1.notified());
    assert_eq!(notifications(&store).len(), 1);
    assert_eq!(store.records_in(COLLECTION_TRASH_LEVELS).len(), 1);
}

#[test]
fn test_only_bins_with_new_writes_are_processed() {
    let store = seeded_store();
    let p = pipeline(&store);
    let feed = ScriptedFeed::new(vec![
        vec![("B1".to_string(), raw(14.0)), ("B2".to_string(), reported(95.0))],
        vec![("B1".to_string(), raw(15.0)), ("B2".to_string(), reported(95.0))],
        vec![("B1".to_string(), raw(16.0)), ("B2".to_string(), reported(95.0))],
    ]);

    let outcomes = run_feed(&p, &feed, 4);

    let bins: Vec<_> = outcomes.iter().map(|(b, _)| b.as_str()).collect();
    assert_eq!(bins, ["B1", "B2", "B1", "B1"]);
    assert_eq!(outcomes[3].1, PipelineOutcome::BelowThreshold { level: 86 });
    assert_eq!(notifications(&store).len(), 1, "B2 sat at 95% and fired once");
}

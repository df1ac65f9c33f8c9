/// Bin monitoring daemon.
///
/// Usage:
///   binmon_service [config.toml]                 watch the feed and notify
///   binmon_service simulate <bin> [d1 d2 ...]    write simulated distances to the feed
///   binmon_service dry-run <bin> [d1 d2 ...]     replay distances through an in-memory pipeline

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use binmon_service::alert::thresholds::ThresholdGate;
use binmon_service::config::{DEFAULT_CONFIG_PATH, Secrets, ServiceConfig};
use binmon_service::ingest::{self, realtime::RealtimeFeed};
use binmon_service::logging::{self, Component, LogLevel};
use binmon_service::messaging::vonage::VonageSms;
use binmon_service::model::BinError;
use binmon_service::pipeline::Pipeline;
use binmon_service::simulate::Simulation;
use binmon_service::store::db::{self, PgStore};
use binmon_service::store::memory::MemoryStore;
use binmon_service::validate::ReadingValidator;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let result = match args.first().map(String::as_str) {
        Some("simulate") => run_simulation(&args[1..]),
        Some("dry-run") => run_dry_run(&args[1..]),
        Some(path) => run_daemon(path),
        None => run_daemon(DEFAULT_CONFIG_PATH),
    };

    if let Err(e) = result {
        eprintln!("binmon_service: {}", e);
        process::exit(1);
    }
}

fn run_daemon(config_path: &str) -> Result<(), BinError> {
    let config = ServiceConfig::load_or_default(config_path)?;
    config.check()?;
    logging::init_logger(
        config.logging.min_level(),
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );

    let secrets = Secrets::from_env()?;
    let client = db::connect_and_verify(db::REQUIRED_TABLES)?;
    let store = Arc::new(PgStore::new(client));

    let gate = ThresholdGate::new(config.gate.mode);
    let gate_mode = gate.mode();
    let mut pipeline =
        Pipeline::with_store(ReadingValidator::new(config.validator.clone()), gate, store)
            .with_dispatch_settings(config.dispatch.clone())
            .with_settings(config.pipeline.clone());

    if config.dispatch.sms_enabled {
        match secrets.vonage_credentials() {
            Some((key, secret)) => {
                let mut sms = VonageSms::new(key, secret, &config.sms.sender)?;
                if let Some(endpoint) = config.sms.endpoint.as_deref() {
                    sms = sms.with_endpoint(endpoint);
                }
                pipeline = pipeline.with_messenger(Arc::new(sms));
            }
            None => logging::warn(
                Component::Sms,
                None,
                "sms_enabled is set but the Vonage credentials are missing; SMS disabled",
            ),
        }
    }

    let feed = RealtimeFeed::new(&secrets.realtime_db_url, secrets.realtime_db_auth.as_deref())?;
    match feed.list_bins() {
        Ok(bins) => logging::info(
            Component::Source,
            None,
            &format!("Feed has {} bins: {}", bins.len(), bins.join(", ")),
        ),
        Err(e) => logging::warn(
            Component::Source,
            None,
            &format!("Feed not reachable yet: {}", e),
        ),
    }
    logging::info(
        Component::System,
        None,
        &format!(
            "Watching {} every {}s (gate: {:?})",
            secrets.realtime_db_url, config.source.poll_interval_secs, gate_mode
        ),
    );

    ingest::watch(
        &feed,
        Duration::from_secs(config.source.poll_interval_secs),
        |changed| {
            let now = Utc::now();
            if !changed.is_empty() {
                pipeline.process_batch(&changed, now);
            }
            pipeline.sweep(now);
            true
        },
    );

    Ok(())
}

fn parse_distances(args: &[String]) -> Result<Vec<f64>, BinError> {
    args.iter()
        .map(|a| {
            a.parse::<f64>()
                .map_err(|_| BinError::Config(format!("not a distance: {}", a)))
        })
        .collect()
}

fn simulation_from_args(args: &[String]) -> Result<Simulation, BinError> {
    let bin_id = args
        .first()
        .ok_or_else(|| BinError::Config("usage: <bin> [distances...]".to_string()))?;
    let distances = parse_distances(&args[1..])?;
    Ok(if distances.is_empty() {
        Simulation::field_check(bin_id)
    } else {
        Simulation::new(bin_id, distances)
    })
}

fn run_simulation(args: &[String]) -> Result<(), BinError> {
    logging::init_logger(LogLevel::Info, None, false);
    let sim = simulation_from_args(args)?;
    let secrets = Secrets::from_env()?;
    let feed = RealtimeFeed::new(&secrets.realtime_db_url, secrets.realtime_db_auth.as_deref())?;
    let written = sim.push_to_feed(&feed)?;
    println!("Wrote {}/{} readings for {}", written, sim.distances_cm.len(), sim.bin_id);
    Ok(())
}

fn run_dry_run(args: &[String]) -> Result<(), BinError> {
    logging::init_logger(LogLevel::Debug, None, true);
    let sim = simulation_from_args(args)?;
    let pipeline = Pipeline::with_store(
        ReadingValidator::default(),
        ThresholdGate::default(),
        Arc::new(MemoryStore::new()),
    );
    let start = Utc::now();
    for (reading, outcome) in sim.readings(start).iter().zip(sim.replay(&pipeline, start)) {
        println!("{:>8} cm -> {:?}", reading.raw_distance_cm.unwrap_or_default(), outcome);
    }
    Ok(())
}

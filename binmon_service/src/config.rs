/// Service configuration.
///
/// Tunables live in a TOML file (default `./binmon.toml`); every section and
/// every key is optional and falls back to the built-in defaults. Secrets and
/// endpoints come from the environment, with `.env` loaded first.
///
/// ```toml
/// [validator]
/// window_span_ms = 3000
/// max_deviation_cm = 5.0
/// min_samples = 2
/// inactive_ttl_secs = 600
///
/// [gate]
/// mode = "every_cycle"   # or "on_change"
///
/// [dispatch]
/// sms_enabled = false
/// sms_users_only = false
/// max_parallel = 4
///
/// [pipeline]
/// max_parallel_bins = 8
/// max_parallel_lookups = 4
///
/// [source]
/// poll_interval_secs = 1
///
/// [sms]
/// sender = "SeaGBin"
/// endpoint = "https://rest.nexmo.com/sms/json"   # optional override
///
/// [logging]
/// level = "info"
/// file = "binmon.log"
/// timestamps = true
/// ```

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::alert::dispatch::DispatchSettings;
use crate::alert::thresholds::GateSettings;
use crate::logging::LogLevel;
use crate::model::BinError;
use crate::pipeline::PipelineSettings;
use crate::validate::ValidatorSettings;

pub const DEFAULT_CONFIG_PATH: &str = "./binmon.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub validator: ValidatorSettings,
    pub gate: GateSettings,
    pub dispatch: DispatchSettings,
    pub pipeline: PipelineSettings,
    pub source: SourceSettings,
    pub sms: SmsSettings,
    pub logging: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub poll_interval_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            poll_interval_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsSettings {
    /// Alphanumeric sender id shown on the recipient's phone.
    pub sender: String,
    /// Gateway URL, when not the default Vonage endpoint.
    pub endpoint: Option<String>,
}

impl Default for SmsSettings {
    fn default() -> Self {
        SmsSettings {
            sender: "SeaGBin".to_string(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

impl LogSettings {
    /// The configured level, or `Info` if the name is not recognized.
    pub fn min_level(&self) -> LogLevel {
        LogLevel::parse(&self.level).unwrap_or(LogLevel::Info)
    }
}

impl ServiceConfig {
    /// Parses a config document.
    pub fn from_toml(text: &str) -> Result<Self, BinError> {
        toml::from_str(text).map_err(|e| BinError::Config(format!("invalid config: {}", e)))
    }

    /// Loads and validates the config at `path`.
    pub fn load(path: &str) -> Result<Self, BinError> {
        let text = fs::read_to_string(path)
            .map_err(|e| BinError::Config(format!("cannot read {}: {}", path, e)))?;
        let config = Self::from_toml(&text)?;
        config.check()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &str) -> Result<Self, BinError> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Rejects settings that would make the pipeline silently useless.
    pub fn check(&self) -> Result<(), BinError> {
        if self.validator.window_span_ms <= 0 {
            return Err(BinError::Config("validator.window_span_ms must be positive".to_string()));
        }
        if self.validator.min_samples == 0 {
            return Err(BinError::Config("validator.min_samples must be at least 1".to_string()));
        }
        if !(self.validator.max_deviation_cm >= 0.0) {
            return Err(BinError::Config(
                "validator.max_deviation_cm must be non-negative".to_string(),
            ));
        }
        let ttl_ms = self.validator.inactive_ttl_secs.checked_mul(1000).ok_or_else(|| {
            BinError::Config("validator.inactive_ttl_secs is out of range".to_string())
        })?;
        if ttl_ms < self.validator.window_span_ms {
            return Err(BinError::Config(
                "validator.inactive_ttl_secs must cover the window span".to_string(),
            ));
        }
        if self.source.poll_interval_secs == 0 {
            return Err(BinError::Config(
                "source.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.pipeline.max_parallel_bins == 0 || self.pipeline.max_parallel_lookups == 0 {
            return Err(BinError::Config("pipeline parallelism must be at least 1".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Endpoints and credentials, read from the environment.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub realtime_db_url: String,
    pub realtime_db_auth: Option<String>,
    pub vonage_api_key: Option<String>,
    pub vonage_api_secret: Option<String>,
}

impl Secrets {
    /// Reads `REALTIME_DB_URL` (required), `REALTIME_DB_AUTH`,
    /// `VONAGE_API_KEY`, and `VONAGE_API_SECRET`.
    pub fn from_env() -> Result<Self, BinError> {
        dotenv::dotenv().ok();
        let realtime_db_url = env::var("REALTIME_DB_URL")
            .map_err(|_| BinError::Config("REALTIME_DB_URL must be set".to_string()))?;

        Ok(Secrets {
            realtime_db_url,
            realtime_db_auth: non_empty_var("REALTIME_DB_AUTH"),
            vonage_api_key: non_empty_var("VONAGE_API_KEY"),
            vonage_api_secret: non_empty_var("VONAGE_API_SECRET"),
        })
    }

    /// Both Vonage credentials, if both are set.
    pub fn vonage_credentials(&self) -> Option<(&str, &str)> {
        match (&self.vonage_api_key, &self.vonage_api_secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Structured logging for the bin monitoring service
///
/// Provides context-rich logging with component and bin identifiers,
/// timestamps, and severity levels. Supports both console output
/// and file-based logging for daemon operations.
///
/// Every failure the pipeline swallows ends up here, so messages carry
/// enough context (bin, recipient, underlying error) for a manual replay.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parses a level name as written in the config file.
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Source,
    Validator,
    Gate,
    Resolver,
    Dispatch,
    Database,
    Sms,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Source => write!(f, "SRC"),
            Component::Validator => write!(f, "VAL"),
            Component::Gate => write!(f, "GATE"),
            Component::Resolver => write!(f, "RCPT"),
            Component::Dispatch => write!(f, "DISP"),
            Component::Database => write!(f, "DB"),
            Component::Sms => write!(f, "SMS"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Likely to clear on its own - connection dropped, timeout, throttling
    Transient,
    /// Will keep failing until someone intervenes - rejected credentials, bad number, schema
    Permanent,
    /// Cannot tell from the error text
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Transient => write!(f, "TRANSIENT"),
            FailureType::Permanent => write!(f, "PERMANENT"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        *LOGGER.lock().unwrap_or_else(PoisonError::into_inner) = Some(logger);
    }

    fn log(&self, level: LogLevel, component: Component, bin_id: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let tagged = format_tagged(component, bin_id, message);
        let log_entry = format_entry(level, &tagged);

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}", tagged),
                LogLevel::Warning => eprintln!("   ⚠ {}", tagged),
                LogLevel::Info => println!("   {}", tagged),
                LogLevel::Debug => {} // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// `<COMPONENT> [bin]: message`, shared by console and file output.
fn format_tagged(component: Component, bin_id: Option<&str>, message: &str) -> String {
    match bin_id {
        Some(bin) => format!("{} [{}]: {}", component, bin, message),
        None => format!("{}: {}", component, message),
    }
}

/// One log line: `<timestamp> <LEVEL> <COMPONENT> [bin]: message`.
fn format_entry(level: LogLevel, tagged: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    format!("{} {} {}", timestamp, level, tagged)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn emit(level: LogLevel, component: Component, bin_id: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
        logger.log(level, component, bin_id, message);
    }
}

/// Log a general informational message
pub fn info(component: Component, bin_id: Option<&str>, message: &str) {
    emit(LogLevel::Info, component, bin_id, message);
}

/// Log a warning message
pub fn warn(component: Component, bin_id: Option<&str>, message: &str) {
    emit(LogLevel::Warning, component, bin_id, message);
}

/// Log an error message
fn error(component: Component, bin_id: Option<&str>, message: &str) {
    emit(LogLevel::Error, component, bin_id, message);
}

/// Log a debug message
pub fn debug(component: Component, bin_id: Option<&str>, message: &str) {
    emit(LogLevel::Debug, component, bin_id, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a store, feed, or gateway failure from its error text
pub fn classify_failure(error_message: &str) -> FailureType {
    let msg = error_message.to_ascii_lowercase();

    if msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection")
        || msg.contains("unavailable")
        || msg.contains("throttled")
    {
        FailureType::Transient
    } else if msg.contains("invalid")
        || msg.contains("unauthorized")
        || msg.contains("credentials")
        || msg.contains("does not exist")
    {
        FailureType::Permanent
    } else {
        FailureType::Unknown
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a failed external call with automatic classification
///
/// Transient failures are warnings (they clear on the next cycle); permanent
/// and unclassified ones are errors, since nothing retries them.
pub fn log_failure(
    component: Component,
    bin_id: &str,
    operation: &str,
    err: &dyn std::error::Error,
) {
    let error_msg = err.to_string();
    let failure_type = classify_failure(&error_msg);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Transient => warn(component, Some(bin_id), &message),
        FailureType::Permanent | FailureType::Unknown => error(component, Some(bin_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Cycle Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one feed cycle
pub fn log_cycle_summary(total: usize, notified: usize, failed: usize) {
    let message = format!(
        "Cycle complete: {} bins, {} notified, {} failed",
        total, notified, failed
    );

    if failed == 0 {
        debug(Component::System, None, &message);
    } else if failed == total {
        error(Component::System, None, &message);
    } else {
        warn(Component::System, None, &message);
    }
}

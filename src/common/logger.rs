//! logging setup
//! - `init_logger` installs pretty_env_logger once per process
//! - `Reporter` is the per-device diagnostic sink, it filters by the
//!   device verbosity before handing messages to the `log` facade

use std::fmt::Display;
use std::io::Error;
use log::{Level, LevelFilter};
use super::setting::Settings;

/// target of every per-device diagnostic, always let through by the
/// logger so the device verbosity is the only gate on them
pub const REPORT_TARGET: &str = "ledudp_report";

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// level of the module logs, `info` unless the settings name one
fn level_filter(settings: &Settings) -> LevelFilter {
    parse_level(settings.env.log_level.as_str()).unwrap_or(LevelFilter::Info)
}

/// init the logger with the process settings
pub fn init_logger() -> Result<(), Error> {
    init_logger_with(level_filter(Settings::get()))
}

pub fn init_logger_with(filter: LevelFilter) -> Result<(), Error> {
    let result = pretty_env_logger::formatted_builder()
        .target(pretty_env_logger::env_logger::Target::Stdout)
        .filter_level(filter)
        .filter_module(REPORT_TARGET, LevelFilter::Trace)
        .try_init();

    if result.is_err() {
        // someone (usually another test) got there first
        log::trace!("logger already initialized");
    }
    Ok(())
}

/// severity of a device diagnostic, lower is more important
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    // critical errors and initialization
    Critical = 1,
    // non critical errors
    Error = 2,
    // notable regular operations
    Notable = 3,
    // everything
    Verbose = 4,
}

impl Severity {
    pub fn level(self) -> Level {
        match self {
            Severity::Critical => Level::Error,
            Severity::Error => Level::Warn,
            Severity::Notable => Level::Info,
            Severity::Verbose => Level::Trace,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reporter {
    name: String,
    verbosity: u8,
}

impl Reporter {
    pub fn new(name: &str, verbosity: u8) -> Self {
        Reporter {
            name: name.to_string(),
            verbosity,
        }
    }

    pub fn enabled(&self, severity: Severity) -> bool {
        self.verbosity != 0 && (severity as u8) <= self.verbosity
    }

    pub fn report(&self, severity: Severity, msg: impl Display) {
        if self.enabled(severity) {
            log::log!(target: REPORT_TARGET, severity.level(), "[{}] {}", self.name, msg);
        }
    }

    /// initialization messages share the critical threshold but are not errors
    pub fn announce(&self, msg: impl Display) {
        if self.enabled(Severity::Critical) {
            log::info!(target: REPORT_TARGET, "[{}] {}", self.name, msg);
        }
    }
}

/// 带 TAG 输出到日志的宏，支持 trace debug info warn error
#[macro_export]
macro_rules! warn {
    ($tag:expr, $($arg:tt)*) => ({
        log::warn!("[{}] {}", $tag, format_args!($($arg)*));
    })
}

#[macro_export]
macro_rules! error {
    ($tag:expr, $($arg:tt)*) => ({
        log::error!("[{}] {}", $tag, format_args!($($arg)*));
    })
}

#[macro_export]
macro_rules! info {
    ($tag:expr, $($arg:tt)*) => ({
        log::info!("[{}] {}", $tag, format_args!($($arg)*));
    })
}

#[macro_export]
macro_rules! debug {
    ($tag:expr, $($arg:tt)*) => ({
        log::debug!("[{}] {}", $tag, format_args!($($arg)*));
    })
}

#[macro_export]
macro_rules! trace {
    ($tag:expr, $($arg:tt)*) => ({
        log::trace!("[{}] {}", $tag, format_args!($($arg)*));
    })
}

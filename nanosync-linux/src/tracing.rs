//! Logging setup: `tracing` is the backend, with a `tracing-log` bridge so
//! the `log` records of the protocol core end up in the same place.

use ::tracing::metadata::LevelFilter;
use serde::Deserialize;

/// The verbosity knob of the daemon
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per packet traces
    Trace,
    /// Protocol level debugging
    Debug,
    /// State transitions and notable events
    #[default]
    Info,
    /// Only problems
    Warn,
    /// Only serious problems
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("unknown log level: {input}")),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{name}")
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Install the global subscriber and the log bridge
pub fn tracing_init(level: LogLevel) {
    if let Err(error) = tracing_log::LogTracer::init() {
        eprintln!("could not install log bridge: {error}");
    }

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(level))
        .init();
}

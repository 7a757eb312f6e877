//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! The library only emits events; the binary installs the subscriber once
//! at startup. Output goes to stderr so stdout stays free for command
//! results.
//!
//! # Log Levels
//!
//! - `warn`: load warnings (unmapped required columns, coercion failures)
//! - `info`: one summary line per load
//! - `debug`: stage progress, generated SQL, lookup row creation
//! - `trace`: per-record resolution

use std::io::{self, IsTerminal};
use std::str::FromStr;

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-field human-readable lines.
    #[default]
    Pretty,
    /// Single-line format.
    Compact,
    /// JSON lines for machine parsing.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// How the subscriber is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub timestamps: bool,
    /// Colored output; off when stderr is not a terminal.
    pub ansi: bool,
}

impl LogConfig {
    /// `-v` raises `base` to debug, `-vv` and beyond to trace.
    #[must_use]
    pub fn from_verbosity(verbosity: u8, base: Level) -> Self {
        let level = match verbosity {
            0 => base,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            format: LogFormat::default(),
            timestamps: false,
            ansi: io::stderr().is_terminal(),
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }
}

/// Install the global subscriber, writing to stderr.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(config.level))
        .with(fmt_layer(config, io::stderr))
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))
}

/// `RUST_LOG` wins over the configured level. Other crates stay at warn.
fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level))
}

fn default_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    EnvFilter::new(format!("warn,rowmap={level}"))
}

fn fmt_layer<S, W>(config: &LogConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_ansi(config.ansi);

    match (config.format, config.timestamps) {
        (LogFormat::Json, _) => layer.json().with_ansi(false).boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
        (LogFormat::Pretty, true) => layer.boxed(),
        (LogFormat::Pretty, false) => layer.without_time().boxed(),
    }
}

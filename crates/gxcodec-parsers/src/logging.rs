//! Logging and tracing utilities for the codecs
//!
//! Structured logging goes through the `tracing` crate. Codecs emit events
//! per section; front ends install a subscriber with [`init_default`] or
//! [`init_with_config`].

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Whether tracing has been initialized
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the default tracing subscriber
///
/// Multiple calls are safe; only the first installs a subscriber.
pub fn init_default() {
    init_with_config(TracingConfig::default());
}

/// Initialize tracing with a custom configuration
pub fn init_with_config(config: TracingConfig) {
    if TRACING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_ok()
    {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_file(config.show_file)
            .with_line_number(config.show_line_number);

        // Another subscriber may already be installed by the host application.
        let _ = tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter)
            .try_init();
    }
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default filter directive (e.g. "info", "warn,gxcodec_parsers=debug")
    pub default_level: String,
    /// Show the target (module path) in log output
    pub show_target: bool,
    /// Show source file in log output
    pub show_file: bool,
    /// Show line number in log output
    pub show_line_number: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: "warn,gxcodec_parsers=info".to_string(),
            show_target: true,
            show_file: false,
            show_line_number: false,
        }
    }
}

impl TracingConfig {
    /// Map a `-v` count onto a filter
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        Self {
            default_level: level.to_string(),
            show_target: verbosity >= 2,
            show_file: verbosity >= 3,
            show_line_number: verbosity >= 3,
        }
    }
}

/// Macros for common logging patterns
#[macro_export]
macro_rules! log_parse_start {
    ($codec:expr, $bytes:expr) => {
        tracing::info!(codec = %$codec, bytes = $bytes, "Starting read")
    };
}

#[macro_export]
macro_rules! log_parse_complete {
    ($codec:expr, $duration:expr, $items:expr) => {
        tracing::info!(
            codec = %$codec,
            duration_ms = %$duration.as_millis(),
            items = %$items,
            "Read complete"
        )
    };
}

#[macro_export]
macro_rules! log_parse_error {
    ($codec:expr, $error:expr) => {
        tracing::error!(codec = %$codec, error = %$error, "Read failed")
    };
}

/// Instrument a codec operation with a span and timing
pub fn instrument_parse<T, F>(name: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let span = tracing::info_span!("codec", codec = %name);
    let _guard = span.enter();

    let start = std::time::Instant::now();
    let result = f();
    let duration = start.elapsed();

    tracing::debug!(duration_ms = %duration.as_millis(), "Codec operation complete");

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(TracingConfig::from_verbosity(0).default_level, "warn");
        assert_eq!(TracingConfig::from_verbosity(2).default_level, "debug");
        assert!(TracingConfig::from_verbosity(3).show_line_number);
    }

    #[test]
    fn test_instrument_parse_returns_value() {
        init_default();
        init_default();
        assert_eq!(instrument_parse("test", || 41 + 1), 42);
    }
}

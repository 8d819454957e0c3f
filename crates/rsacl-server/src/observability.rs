//! Structured logging and metric descriptions.
//!
//! Logging goes through `tracing-subscriber` with an `EnvFilter` (`RUST_LOG`
//! wins over the configured level) and either a JSON or a pretty layer.
//! Metrics are recorded through the `metrics` facade; the binary installs no
//! exporter, so recording is a no-op unless the embedding process installs
//! a recorder.
//!
//! # Metrics
//!
//! - `rsacl_closure_builds_total` - Closure records written, by kind
//! - `rsacl_closure_build_failures_total` - Builds that returned an error
//! - `rsacl_closure_build_duration_seconds` - Per-user build duration
//! - `rsacl_closure_builds_deferred_total` - Builds deferred to the tick

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::LoggingSettings;

pub const BUILDS_TOTAL: &str = "rsacl_closure_builds_total";
pub const BUILD_FAILURES_TOTAL: &str = "rsacl_closure_build_failures_total";
pub const BUILD_DURATION_SECONDS: &str = "rsacl_closure_build_duration_seconds";
pub const BUILDS_DEFERRED_TOTAL: &str = "rsacl_closure_builds_deferred_total";

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether to use JSON format (true) or text format (false)
    pub json_format: bool,
    /// The default log level if RUST_LOG is not set
    pub default_level: Level,
    /// Whether to include span events (enter/exit)
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            json_format: settings.json,
            default_level: parse_log_level(&settings.level),
            include_spans: settings.spans,
        }
    }
}

/// Initialize the logging subsystem with the given configuration.
///
/// Subsequent calls have no effect (the subscriber is global).
pub fn init_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        );
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_target(true),
        );
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Registers descriptions for the closure build metrics.
pub fn describe_metrics() {
    metrics::describe_counter!(BUILDS_TOTAL, "Closure records written");
    metrics::describe_counter!(BUILD_FAILURES_TOTAL, "Closure builds that failed");
    metrics::describe_histogram!(
        BUILD_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Duration of one user's closure build"
    );
    metrics::describe_counter!(
        BUILDS_DEFERRED_TOTAL,
        "Closure builds deferred because the user was already being built"
    );
}

/// Parse log level from string; unknown values fall back to INFO.
pub fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Creates a JSON subscriber writing to `writer`, for capturing log output.
#[cfg(test)]
fn create_json_layer<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A writer that captures output to a shared buffer.
    #[derive(Clone)]
    struct CaptureWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl CaptureWriter {
        fn new() -> Self {
            Self {
                buffer: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn output(&self) -> String {
            String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
        }
    }

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Level::TRACE);
        assert_eq!(parse_log_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_log_level("Info"), Level::INFO);
        assert_eq!(parse_log_level("WARN"), Level::WARN);
        assert_eq!(parse_log_level("error"), Level::ERROR);
        assert_eq!(parse_log_level("unknown"), Level::INFO);
    }

    #[test]
    fn test_logging_config_from_settings() {
        let config = LoggingConfig::from(&LoggingSettings {
            level: "debug".to_string(),
            json: true,
            spans: false,
        });
        assert!(config.json_format);
        assert_eq!(config.default_level, Level::DEBUG);
        assert!(!config.include_spans);

        let config = LoggingConfig::from(&LoggingSettings {
            level: "nonsense".to_string(),
            json: false,
            spans: true,
        });
        assert!(config.include_spans);
        assert_eq!(config.default_level, Level::INFO);
    }

    /// Test: Structured logs are JSON formatted
    #[test]
    fn test_structured_logs_are_json_formatted() {
        let writer = CaptureWriter::new();
        let subscriber = create_json_layer(writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(user = "alice", relations = 3, "closure record written");
        });

        let output = writer.output();
        assert!(!output.is_empty(), "Should have captured log output");

        for line in output.lines().filter(|l| !l.is_empty()) {
            let json: serde_json::Value = serde_json::from_str(line)
                .unwrap_or_else(|e| panic!("log line should be JSON: {line} ({e})"));
            assert!(json.get("level").is_some());
            assert!(json.get("target").is_some());
        }
    }
}

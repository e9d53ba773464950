//! Structured logging for the emergency CLI.
//!
//! - Human-readable console output for interactive use
//! - JSONL for collection by other tooling
//!
//! stdout is reserved for the run summary; all log output goes to stderr.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events are shown at the configured level.
const LOG_TARGETS: &[&str] = &["ed_core", "ed_bundle", "emergency"];

/// Initialize the logging subsystem.
///
/// Call once at startup. A second call is ignored. `config.rust_log` is only
/// set when neither `EMERGENCY_LOG` nor `-v`/`-q` chose the level.
pub fn init_logging(config: &LogConfig) {
    let filter = build_filter(config);

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = config.color && std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    match config.rust_log.as_deref().map(EnvFilter::try_new) {
        Some(Ok(filter)) => filter,
        _ => default_filter(config.level),
    }
}

fn default_filter(level: LogLevel) -> EnvFilter {
    let directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    EnvFilter::new(directives.join(","))
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    format!("run-{}", &uuid.simple().to_string()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();

        assert!(id1.starts_with("run-"));
        assert_ne!(id1, id2);
        // Format: run-<12 hex chars>
        assert_eq!(id1.len(), 16);
        assert!(id1[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_default_filter_covers_all_crates() {
        let filter = default_filter(LogLevel::Debug).to_string();
        for target in LOG_TARGETS {
            assert!(filter.contains(&format!("{}=debug", target)), "{filter}");
        }
    }

    #[test]
    fn test_build_filter_prefers_resolved_level() {
        let quiet = LogConfig::default().with_level(LogLevel::Error);
        assert!(build_filter(&quiet).to_string().contains("ed_core=error"));

        let mut from_env = LogConfig::default();
        from_env.rust_log = Some("ed_bundle=trace".to_string());
        let filter = build_filter(&from_env).to_string();
        assert!(filter.contains("ed_bundle=trace"), "{filter}");
        assert!(!filter.contains("ed_core"), "{filter}");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = LogConfig::default().with_level(LogLevel::Off);
        init_logging(&config);
        init_logging(&config);
    }
}

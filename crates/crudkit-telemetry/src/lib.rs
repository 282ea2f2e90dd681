mod severity;

pub use severity::{report, LogSeverity, ParseSeverityError};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log output settings for the crudkit processes.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Base level for every target.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "crudkit_store" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json: true,
            module_levels: vec![],
        }
    }
}

/// Filter directives built from the config, e.g. `info,crudkit_store=debug`.
pub fn filter_directives(config: &TelemetryConfig) -> String {
    std::iter::once(lowercase(config.log_level))
        .chain(
            config
                .module_levels
                .iter()
                .map(|(target, level)| format!("{target}={}", lowercase(*level))),
        )
        .collect::<Vec<_>>()
        .join(",")
}

fn lowercase(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}

/// Install the global subscriber. Returns false if one was already set.
///
/// `RUST_LOG` wins over the configured directives when present.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::new(filter_directives(config)),
    };

    let output = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };

    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives() {
        assert_eq!(filter_directives(&TelemetryConfig::default()), "info");
    }

    #[test]
    fn module_overrides_are_appended() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("crudkit_store".into(), Level::DEBUG),
                ("tower_http".into(), Level::TRACE),
            ],
            json: false,
        };
        assert_eq!(
            filter_directives(&config),
            "warn,crudkit_store=debug,tower_http=trace"
        );
    }

    #[test]
    fn second_init_is_rejected() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(!init_telemetry(&config));
    }
}

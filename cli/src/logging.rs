// Logging for the coach CLI, powered by tracing-subscriber.
//
// coach-link logs through the `log` facade; a `tracing_log::LogTracer`
// bridge routes those records into the subscriber installed here. Logs go to
// stderr so stdout stays reserved for the event stream.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{CLIError, Result};

/// Log format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact text format: timestamp LEVEL target - message
    Compact,
    /// JSON Lines format for structured logging
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Build the `EnvFilter` from `RUST_LOG` if set, otherwise from `level`,
/// with noisy transport crates held at `warn`.
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    let noisy: &[(&str, &str)] = &[
        ("tungstenite", "warn"),
        ("tokio_tungstenite", "warn"),
        ("rustls", "warn"),
        ("hyper", "warn"),
        ("hyper_util", "warn"),
        ("reqwest", "warn"),
    ];
    for (target, lvl) in noisy {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| CLIError::LoggingError(format!("Invalid filter '{}': {}", filter_str, e)))
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    // Bridge `log` crate -> tracing (ok() in case already initialized)
    tracing_log::LogTracer::init().ok();

    let layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(build_env_filter(level)?)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(build_env_filter(level)?)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| CLIError::LoggingError(e.to_string()))?;

    tracing::trace!("Logging initialized: level={}, format={:?}", level, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSONL"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Compact);
    }

    #[test]
    fn test_env_filter_accepts_plain_level() {
        assert!(build_env_filter("debug").is_ok());
    }
}

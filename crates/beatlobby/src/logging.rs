//! Log bootstrap via `tracing-subscriber`.
//!
//! `RUST_LOG` overrides the level from the settings file. The format is
//! either plain text or one JSON object per line.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingSettings;

/// Installs the global subscriber. A second call is a no-op, which keeps
/// tests that start several servers from tripping over each other.
pub fn init(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if settings.format.eq_ignore_ascii_case("json") {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

pub fn is_valid_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

pub fn is_valid_format(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(is_valid_level(level), "{level}");
        }
        assert!(!is_valid_level("verbose"));
        assert!(!is_valid_level("INFO"));
        assert!(!is_valid_level(""));
    }

    #[test]
    fn test_valid_formats() {
        assert!(is_valid_format("text"));
        assert!(is_valid_format("json"));
        assert!(!is_valid_format("xml"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let settings = LoggingSettings::default();
        init(&settings);
        init(&settings);
    }
}

//! # tally-logging
//!
//! Installs the process-wide `tracing` subscriber.
//!
//! Library crates in this workspace only emit events through `tracing`
//! macros with structured fields (`version`, `driver`, `event_type`, ...);
//! the binary or test harness decides where they go by calling
//! [`init_subscriber`] once at startup.

#![deny(unsafe_code)]

use tally_settings::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Directive used when the configured one does not parse.
const FALLBACK_DIRECTIVE: &str = "info";

/// Build the level filter. `RUST_LOG` wins over `default_directive`.
pub fn build_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| parse_directive(default_directive))
}

fn parse_directive(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("tally-logging: invalid log directive {directive:?} ({e}), using {FALLBACK_DIRECTIVE}");
        EnvFilter::new(FALLBACK_DIRECTIVE)
    })
}

/// Install the global subscriber described by `settings`.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one is left in place.
pub fn init_subscriber(settings: &LoggingSettings) -> bool {
    let filter = build_filter(&settings.level);

    let result = if settings.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()
    };

    result.is_ok()
}

/// Subscriber for tests: output goes through the libtest capture.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(build_filter("debug"))
        .try_init();
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn valid_directive_is_kept() {
        let filter = parse_directive("warn");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn invalid_directive_falls_back() {
        let filter = parse_directive("tally_store=notalevel");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn second_install_is_refused() {
        let settings = LoggingSettings::default();
        let _ = init_subscriber(&settings);
        assert!(!init_subscriber(&settings));
        tracing::info!("subscriber active");
    }
}

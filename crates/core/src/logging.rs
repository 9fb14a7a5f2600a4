//! Tracing subscriber setup
//!
//! Libraries only emit `tracing` events; binaries and tests decide whether
//! and how to install a subscriber by calling [`init_tracing`].

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};
use std::io;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CRATES: [&str; 5] = [
    "cairn_core",
    "cairn_store",
    "cairn_vcs",
    "cairn_digest",
    "cairn_task_graph",
];

/// Build the event filter: explicit directives first, then `RUST_LOG`,
/// then the configured level for the cairn crates.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for unparsable directives.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Some(filter) = &config.filter {
        return EnvFilter::try_new(filter)
            .map_err(|e| Error::configuration(format!("invalid log filter '{filter}': {e}")));
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = config.level.as_str();
            EnvFilter::try_new(
                CRATES
                    .iter()
                    .map(|c| format!("{c}={level}"))
                    .collect::<Vec<_>>()
                    .join(","),
            )
        })
        .map_err(|e| Error::configuration(format!("failed to create tracing filter: {e}")))
}

/// Install a global subscriber writing to stderr.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the filter is invalid or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(config)?);

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(io::stderr)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(io::stderr)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
    };
    installed.map_err(|e| Error::configuration(format!("tracing already initialized: {e}")))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_explicit_filter_wins() {
        let config = LoggingConfig {
            filter: Some("cairn_core=trace".to_string()),
            ..LoggingConfig::default()
        };
        let filter = build_filter(&config).unwrap();
        assert_eq!(filter.to_string(), "cairn_core=trace");
    }

    #[test]
    fn test_level_applies_to_every_crate() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            ..LoggingConfig::default()
        };
        let filter = temp_env::with_var_unset("RUST_LOG", || build_filter(&config).unwrap());
        let rendered = filter.to_string();
        for krate in CRATES {
            assert!(rendered.contains(&format!("{krate}=debug")), "{rendered}");
        }
    }

    #[test]
    fn test_invalid_filter_is_configuration_error() {
        let config = LoggingConfig {
            filter: Some("=[".to_string()),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            build_filter(&config),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig {
            format: LogFormat::Compact,
            ..LoggingConfig::default()
        };
        // The first call may lose to another test in this binary; the
        // second one can never succeed.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}

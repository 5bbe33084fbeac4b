//! Process logging setup.
//!
//! Operational messages go through the `log` facade and task execution is wrapped
//! in `tracing` spans. [`init_logging`] installs a `tracing-subscriber` registry
//! and bridges `log` records into it through `tracing-log`. `RUST_LOG` overrides
//! the configured level when set.

use thiserror::Error;
use tracing::Subscriber;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Builds the filter: `RUST_LOG` when present, the configured level otherwise.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = config.level.as_str();
    EnvFilter::try_new(directive).map_err(|e| LoggingError::Filter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber. Calling it twice returns an error.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => install(
            registry.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            ),
        ),
        LogFormat::Text => install(registry.with(fmt::layer().with_target(true))),
    }
}

fn install<S>(subscriber: S) -> Result<(), LoggingError>
where
    S: Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    LogTracer::init().map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    log::debug!("Logging initialized");
    Ok(())
}

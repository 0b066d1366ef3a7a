// Tracing log adapter - Installs the global tracing subscriber

use tracing_subscriber::EnvFilter;

use crate::adapters::toml_config::{LogFormat, LogLevel, LoggingSettings};
use crate::domain::errors::*;

/// Tracing subscriber setup for the binary
pub struct TracingLogAdapter;

impl TracingLogAdapter {
    /// Filter from `RUST_LOG` if set, else from the configured level
    pub fn filter(settings: &LoggingSettings) -> Result<EnvFilter, DomainError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let level = LogLevel::parse(&settings.level)?;
        EnvFilter::try_new(level.as_str())
            .map_err(|e| DomainError::BadArgs(format!("Invalid log filter: {}", e)))
    }

    /// Install the global subscriber; logs go to stderr so stdout stays machine readable
    pub fn init(settings: &LoggingSettings) -> Result<(), DomainError> {
        let filter = Self::filter(settings)?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        let result = match settings.format {
            LogFormat::Pretty => builder.with_target(false).try_init(),
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().with_current_span(true).try_init(),
        };
        result.map_err(|e| DomainError::BadArgs(format!("Failed to initialize logging: {}", e)))
    }
}

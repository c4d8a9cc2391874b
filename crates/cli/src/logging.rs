//! Structured logging setup for the `kest` binary

use std::io;

use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{CliConfig, Environment, LogFormat};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Full filter directive; overrides `level` when set
    pub env_filter: Option<String>,
    pub environment: Environment,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Plain,
            env_filter: None,
            environment: Environment::Development,
        }
    }
}

impl LoggingConfig {
    pub fn from_cli(config: &CliConfig) -> Self {
        Self {
            level: config.log_level.clone(),
            format: config.log_format,
            env_filter: None,
            environment: config.environment,
        }
    }

    /// Raise the engine's own events to `debug` regardless of the base level
    pub fn verbose(mut self) -> Self {
        self.env_filter = Some(format!("{},kest_migrate=debug", self.level));
        self
    }

    fn directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine readable.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config.directive()))?;

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init()?,
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr))
            .try_init()?,
    }

    tracing::debug!(
        target: "kest::logging",
        level = %config.level,
        environment = %config.environment,
        "Logging initialized"
    );

    Ok(())
}

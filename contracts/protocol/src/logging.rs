//! Structured logging
//!
//! Installs the global `tracing` subscriber for a process hosting the
//! protocol (relay, keeper, operator tooling). Output goes to stderr with an
//! `EnvFilter`. `RUST_LOG` overrides the configured level and
//! `KEEL_LOG_FORMAT` the configured format, e.g.
//!
//! ```text
//! RUST_LOG=keel_vault_engine=debug,keel_bridge=info KEEL_LOG_FORMAT=json
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keel_common::{KeelError, KeelResult};

/// Environment variable that overrides [`LoggingConfig::format`]
pub const LOG_FORMAT_ENV: &str = "KEEL_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for local runs.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl LogFormat {
    /// "json" (any case) selects `Json`; anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Logging section of [`crate::KeelConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: LogFormat::Pretty }
    }
}

/// Install the global subscriber.
///
/// Fails with `KeelError::Config` if the directives do not parse or a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> KeelResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| KeelError::Config(format!("log level {:?}: {e}", config.level)))?,
    };

    let format = std::env::var(LOG_FORMAT_ENV)
        .map(|value| LogFormat::from_str_lossy(&value))
        .unwrap_or(config.format);

    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init(),
    };
    installed.map_err(|e| KeelError::Config(format!("logging already initialized: {e}")))?;

    tracing::info!(?format, "logging initialized");
    Ok(())
}

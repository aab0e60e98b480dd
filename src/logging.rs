//! Logging setup for hosts embedding script nodes
//!
//! Script output is emitted under the `script` target with a `node` field,
//! so it can be filtered separately, e.g. `RUST_LOG=warn,script=info`.

use crate::config::LogSettings;
use crate::error::{Result, ScriptError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parse `EnvFilter` directives.
pub fn build_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| ScriptError::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. When a log
/// directory is configured, a daily rolling file is written alongside the
/// console output; keep the returned guard alive to flush it.
pub fn init_logging(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&settings.filter)?,
    };
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer());

    let guard = match &settings.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &settings.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| ScriptError::Config(format!("Failed to install logger: {}", e)))?;
            Some(guard)
        }
        None => {
            registry
                .try_init()
                .map_err(|e| ScriptError::Config(format!("Failed to install logger: {}", e)))?;
            None
        }
    };

    tracing::debug!("Logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        assert!(build_filter("info,scriptnode=debug").is_ok());
        assert!(build_filter("scriptnode=notalevel").is_err());
    }
}

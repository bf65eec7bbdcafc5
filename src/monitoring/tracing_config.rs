//! Structured logging with tracing
//!
//! Sets up:
//! - Console logging on stderr (text or JSON)
//! - Optional file logging with daily rotation, always JSON
//! - Level filtering from RUST_LOG, falling back to the configured level

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::config::{LogFormat, MonitoringConfig};

/// Initialize the global tracing subscriber.
///
/// Returns the file writer guard when file logging is on; keep it alive for
/// the life of the program or buffered lines are lost. Calling this twice is
/// harmless: the second install is ignored.
pub fn init_tracing(config: &MonitoringConfig) -> std::io::Result<Option<WorkerGuard>> {
    if !config.enabled {
        return Ok(None);
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let console_layer = match config.log_format {
        LogFormat::Json => fmt::layer().with_writer(std::io::stderr).json().boxed(),
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .boxed(),
    };

    let (file_layer, guard) = if config.enable_file_logging {
        config.ensure_log_dir()?;
        let file_appender = daily(&config.log_dir, "presales-core.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(non_blocking_file)
            .with_ansi(false) // No ANSI codes in files
            .json();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_initialization() {
        let config = MonitoringConfig::default();
        let result = init_tracing(&config);
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_tracing_disabled() {
        let mut config = MonitoringConfig::default();
        config.enabled = false;
        assert!(init_tracing(&config).unwrap().is_none());
    }

    #[test]
    fn test_file_logging_returns_guard() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MonitoringConfig::default();
        config.enable_file_logging = true;
        config.log_dir = dir.path().join("logs");

        let guard = init_tracing(&config).unwrap();
        assert!(guard.is_some());
        assert!(config.log_dir.exists());
    }
}

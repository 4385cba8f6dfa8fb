//! Logging setup
//!
//! Installs one `tracing` subscriber for the process: an env filter, a
//! stderr layer and, when configured, an append-mode file layer.

use crate::config::LoggingConfig;
use anyhow::Result;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging from `config`.
///
/// `RUST_LOG` wins over `config.level` when it is set. Output goes to
/// stderr so interactive chat output on stdout stays clean.
///
/// # Errors
///
/// Fails on an invalid filter directive, an unwritable log file, or when a
/// global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use studymate::config::LoggingConfig;
/// use studymate::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "studymate=info".to_string(),
///     json_format: true,
///     file_path: None,
/// };
///
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let file = config.file_path.as_deref().map(open_log_file).transpose()?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .with(file.map(|f| fmt::layer().json().with_current_span(true).with_writer(f)))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(file.map(|f| fmt::layer().with_ansi(false).with_writer(f)))
            .try_init()?;
    }

    Ok(())
}

fn open_log_file(path: &Path) -> Result<Arc<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}

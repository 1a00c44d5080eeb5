//! tracing-subscriber bootstrap honoring the configured level and log file.

use crate::Settings;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize global logging from settings.
///
/// The `RUST_LOG` environment variable, when set, takes precedence over the
/// configured level. Safe to call more than once; later calls are no-ops.
pub fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.to_lowercase()));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match &settings.log_file {
        Some(path) => {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => builder
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .try_init(),
                Err(e) => {
                    eprintln!(
                        "failed to open log file {}: {e}; logging to stderr",
                        path.display()
                    );
                    fmt()
                        .with_env_filter(
                            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                                EnvFilter::new(settings.log_level.to_lowercase())
                            }),
                        )
                        .with_writer(std::io::stderr)
                        .try_init()
                }
            }
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    // A second init (tests, embedding applications) is not an error.
    let _ = result;
}

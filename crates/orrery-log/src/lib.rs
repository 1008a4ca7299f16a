//! Structured logging for orrery via the `tracing` ecosystem.
//!
//! Console output carries uptime timestamps, module targets and thread
//! names (the data pipeline names its workers). Debug builds can also write
//! a JSON log file next to the run for offline analysis of LOD churn.

use std::path::Path;

use orrery_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config provides one.
pub const DEFAULT_FILTER: &str = "info,orrery_data=warn";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "orrery.log";

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The log directory or file could not be created.
    #[error("failed to open log file: {0}")]
    File(#[source] std::io::Error),

    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Install(#[source] tracing_subscriber::util::TryInitError),
}

/// Pick the filter string: the config's `log_level` if set, else [`DEFAULT_FILTER`].
#[must_use]
pub fn filter_string(config: Option<&Config>) -> String {
    match config {
        Some(c) if !c.debug.log_level.trim().is_empty() => c.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create an `EnvFilter` with [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// Install the global subscriber, reporting failures instead of panicking.
///
/// `RUST_LOG` wins over the config. With `debug_build` and a `log_dir`, a
/// JSON file layer is added.
pub fn try_init_logging(
    log_dir: Option<&Path>,
    debug_build: bool,
    config: Option<&Config>,
) -> Result<(), LogError> {
    let filter_str = filter_string(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    match log_dir {
        Some(dir) if debug_build => {
            std::fs::create_dir_all(dir).map_err(LogError::File)?;
            let file = std::fs::File::create(dir.join(LOG_FILE_NAME)).map_err(LogError::File)?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::uptime())
                .json();
            subscriber.with(file_layer).try_init().map_err(LogError::Install)
        }
        _ => subscriber.try_init().map_err(LogError::Install),
    }
}

/// Install the global subscriber. Failures are printed to stderr and ignored.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    if let Err(e) = try_init_logging(log_dir, debug_build, config) {
        eprintln!("logging disabled: {e}");
    }
}

//! Structured logging for Myst binaries.
//!
//! Library crates log through the `log` facade; binaries install this `tracing`
//! subscriber, which also picks up `log` records. Console output carries uptime
//! timestamps and module paths. Debug builds can additionally write JSON logs
//! for post-mortem analysis of frame traces.

use myst_config::Config;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config provide one.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// File name of the JSON log inside the log directory.
pub const LOG_FILE_NAME: &str = "myst.log";

/// Pick the filter directive: the config's log level when set, the default otherwise.
pub fn filter_directive(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the config's log level. A JSON file layer
/// is added only in debug builds, when `config.debug.log_to_file` is set and
/// `log_dir` is writable.
///
/// Returns an error if a global subscriber was already installed.
///
/// ```no_run
/// use myst_config::Config;
/// use myst_log::init_logging;
///
/// let config = Config::default();
/// init_logging(None, Some(&config)).ok();
/// ```
pub fn init_logging(
    log_dir: Option<&Path>,
    config: Option<&Config>,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter_str = filter_directive(config);
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

    let wants_file = cfg!(debug_assertions) && config.is_some_and(|c| c.debug.log_to_file);
    if wants_file
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        return subscriber.with(file_layer).try_init();
    }

    subscriber.try_init()
}

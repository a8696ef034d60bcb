//! Logging initialization and configuration.
//!
//! Logs go to stderr; stdout is reserved for command output and results.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "shell_runner=info";

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `shell_runner=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Ok(())` if successful, or `Err` if logging has already been
/// initialized.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init()
}

/// Initialize logging with an explicit filter directive.
///
/// A bare level such as `debug` applies to this crate only; anything else
/// is handed to [`EnvFilter`] as is. Invalid directives fall back to
/// [`DEFAULT_FILTER`].
pub fn init_with_filter(filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_new(filter_directive(filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init()
}

fn filter_directive(filter: &str) -> String {
    let filter = filter.trim();
    match filter.to_ascii_lowercase().as_str() {
        "" => DEFAULT_FILTER.to_string(),
        level @ ("error" | "warn" | "info" | "debug" | "trace" | "off") => {
            format!("shell_runner={}", level)
        }
        _ => filter.to_string(),
    }
}

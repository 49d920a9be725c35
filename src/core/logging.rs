//! Logging setup using tracing and tracing-subscriber
//!
//! Events go to stderr so that stdout stays clean for piping.
//! `RUST_LOG` wins over the configured default filter.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber
///
/// `default_filter` is used when `RUST_LOG` is not set; `verbose` raises it to `debug`.
pub fn init(default_filter: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { default_filter };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Initialize logging for tests
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

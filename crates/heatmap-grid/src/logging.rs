use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install the stderr log subscriber
///
/// If RUST_LOG is not set, debug builds default to `debug` and release builds to `info`.
/// Must run before any other thread is spawned.
pub fn setup_logging() {
    let defaulted = std::env::var("RUST_LOG").is_err();
    if defaulted {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "debug,redis=info");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    if defaulted {
        tracing::debug!(
            "RUST_LOG set to default: {}",
            std::env::var("RUST_LOG").unwrap_or_default()
        );
    }
}

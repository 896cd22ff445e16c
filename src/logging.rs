//! Structured logging for the provider binary.
//!
//! Everything goes to **stderr**: stdout carries the handshake line the
//! runtime parses.
//!
//! `RUST_LOG` selects what is shown, e.g. `RUST_LOG=upcloud_provider=debug`
//! to see every API call and poll attempt. Without it the provider logs at
//! `info`, and the HTTP/2 and transport crates are capped at `warn`.

use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const QUIET_TRANSPORT: &str = "h2=warn,hyper=warn,hyper_util=warn,tower=warn";

fn default_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", default_level, QUIET_TRANSPORT)))
}

fn subscriber(default_level: &str) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(default_filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the stderr subscriber at `info` unless `RUST_LOG` says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber is already set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`] with a different fallback level.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Install the subscriber unless one is already set. Returns whether it was
/// installed.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_parse() {
        assert!(EnvFilter::try_new(format!("info,{}", QUIET_TRANSPORT)).is_ok());
        assert!(EnvFilter::try_new("warn,upcloud_provider=debug").is_ok());
    }

    #[test]
    fn test_second_init_is_refused() {
        // Other tests may already have installed one.
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}

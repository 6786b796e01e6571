//! src/logging.rs
//!
//! Tracing setup for binaries that embed the provider.
//!
//! Provider events carry these fields:
//! - `pass` on pass boundaries and on loader start, finish and failure
//! - `file` on stream open and exhaustion
//! - `weight` on every draw from the pool

use tracing_subscriber::EnvFilter;

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "DATA_PROVIDER_LOG";

/// Installs a fmt subscriber filtered by [`env_filter`]. Thread names are
/// shown so loader events stand apart from the caller's. Does nothing if a
/// global subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_thread_names(true)
        .try_init();
}

/// `DATA_PROVIDER_LOG` first, then `RUST_LOG`, then `info`.
pub fn env_filter() -> EnvFilter {
    filter_from(std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok())
}

/// The first candidate that parses wins.
fn filter_from(own: Option<String>, rust_log: Option<String>) -> EnvFilter {
    own.into_iter()
        .chain(rust_log)
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

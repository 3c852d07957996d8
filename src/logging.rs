//! Log output for the `finrag` binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary (or to embedding applications).

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG` takes precedence when set. Otherwise the level is `info`, or
/// `debug` for finrag's own events when `verbose` is set.
pub fn init(verbose: bool) {
    let fallback = if verbose { "info,finrag=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A subscriber may already be installed (e.g. by a host application).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#![forbid(unsafe_code)]

//! Log output for the demo binary.

use tracing_subscriber::EnvFilter;

/// Install a global subscriber: human-readable by default, JSON lines
/// when `json` is set. `RUST_LOG` selects the filter (default `info`).
///
/// Returns `false` if a subscriber was already installed.
pub fn init(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

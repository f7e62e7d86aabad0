//! Tracing setup for binaries and tests embedding the client

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `filter`, or by `RUST_LOG`
///
/// Falls back to `info` when neither is usable. Returns `false` if a global
/// subscriber was already installed, which leaves that subscriber in place.
pub fn init(filter: Option<&str>) -> bool {
    let filter = filter
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Initialize the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` for
/// this crate when `verbose` is on. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "info,clvforge=debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

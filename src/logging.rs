// File: src/logging.rs
use tracing_subscriber::EnvFilter;

/// Installs a stderr logger. `RUST_LOG` overrides `default_level`.
///
/// Library code logs through the `log` facade; the subscriber's log bridge
/// picks those records up. Calling this twice is harmless.
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

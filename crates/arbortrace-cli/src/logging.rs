use tracing_subscriber::EnvFilter;

/// Initialize the process-wide tracing subscriber.
///
/// `RUST_LOG` wins when set; `fallback_level` applies otherwise. The core
/// crates never configure logging themselves — they emit into injected
/// sinks — so this is the only place the subscriber is installed.
pub fn init(fallback_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "TASKLANE_LOG";

/// Pick the filter directive: `TASKLANE_LOG`, then `RUST_LOG`, then `fallback`.
pub fn filter_directive(fallback: &str) -> String {
    [LOG_ENV, "RUST_LOG"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Install the global stderr subscriber. Later calls are no-ops.
pub fn init_logging(fallback: &str) {
    let directive = filter_directive(fallback);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

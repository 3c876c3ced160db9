use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber: human-readable output in debug
/// builds, JSON in release builds for log aggregation. The filter comes
/// from `RUST_LOG` (default `info`). Thread names are included; the core
/// and timer threads are named.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    if cfg!(debug_assertions) {
        builder.init();
    } else {
        builder.json().init();
    }
}

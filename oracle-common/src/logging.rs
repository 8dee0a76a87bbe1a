use tracing_subscriber::EnvFilter;

/// Initialises the process-wide `tracing` subscriber, honouring `RUST_LOG`
/// and falling back to `info`. Mirrors the teacher's
/// `tracing_subscriber::fmt().with_max_level(...).init()` call in
/// `main.rs`, generalised to an env filter so per-module verbosity can be
/// tuned without a rebuild.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the process-wide tracing subscriber. Safe to call more than
/// once per process (e.g. from multiple integration tests); a prior global
/// subscriber is left in place rather than panicking.
pub fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Test-only logging init, always at TRACE level.
pub fn init_test_log() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

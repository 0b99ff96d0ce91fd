use tracing_subscriber::EnvFilter;

pub fn setup_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stderr());

    // try_init: a second call (tests, mobile re-entry) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(is_terminal)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::info!(
        "Logging initialized with level: {:?}",
        std::env::var("RUST_LOG")
    );
}

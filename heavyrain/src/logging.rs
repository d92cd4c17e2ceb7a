use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Logs go to stderr so reports on stdout stay machine-readable.
///
/// `HEAVYRAIN_LOG` (or `RUST_LOG`) wins over the verbosity flag.
pub(crate) fn init_logging(verbosity: u8) {
    let fallback = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("HEAVYRAIN_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map_or_else(
            |_| EnvFilter::new(fallback),
            |value| EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new(fallback)),
        );

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set global default subscriber: {err}");
    }
}

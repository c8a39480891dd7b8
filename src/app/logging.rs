use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_directive`. Output goes to stderr so that
/// stdout stays free for reports. Calling this twice keeps the first
/// subscriber.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if let Err(error) = installed {
        debug!(%error, "tracing subscriber already installed, keeping it");
    }
}

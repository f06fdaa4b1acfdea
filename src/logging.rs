use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide fmt subscriber on stderr. `RUST_LOG` overrides the default `info`
/// filter.
///
/// Returns an error when a subscriber is already installed, which callers in tests ignore.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))
}

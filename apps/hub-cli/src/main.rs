//! hubwire command-line client entry point.
//!
//! Usage: `hubwire [CONFIG_PATH]`

mod app;
mod config;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting hubwire");

    let path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => config::default_config_path()?,
    };
    let config = config::Config::load(&path)?;
    tracing::info!(path = %path.display(), base_uri = %config.base_uri, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("hubwire shut down cleanly");
    Ok(())
}

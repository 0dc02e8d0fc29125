//! Site Safety Monitor - Main Entry Point

use daemon::{init_logging, run, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    init_logging(&settings.log)?;

    info!("=== Site Safety Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Starting {} camera(s)...", settings.cameras.len());

    run(settings).await
}

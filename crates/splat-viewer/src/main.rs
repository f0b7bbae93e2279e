//! Entry point for the headless splat viewer.

use anyhow::Result;
use clap::Parser;
use splat_viewer::{app, config::Config};

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    log::debug!("{config:?}");

    if let Err(err) = app::run(&config) {
        log::error!("splat-viewer failed: {err:#}");
        return Err(err);
    }
    Ok(())
}

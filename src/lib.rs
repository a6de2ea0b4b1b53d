pub mod controllers;
pub mod db;
pub mod engine;
pub mod errors;
pub mod flights;
pub mod geo;
pub mod interactions;
pub mod occupancy;
pub mod sectors;
pub mod sessions;
pub mod settings;
pub mod sweeps;
pub mod utils;

use std::path::PathBuf;

use anyhow::Context;

pub use engine::{Engine, IngestReport};
pub use errors::{EngineError, Result};
pub use settings::EngineConfig;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "ATC_CONTACT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "atc_contact.json";

/// Starts the engine and its sweeps and runs until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("atc_contact starting up...");

    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let engine = Engine::open(config).context("failed to start engine")?;

    let mut sweeps = sweeps::SweepController::new();
    sweeps.start(&engine)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    log::info!("Shutdown requested, stopping sweeps");

    sweeps.stop().await?;
    Ok(())
}

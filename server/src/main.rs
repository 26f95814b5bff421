//! Skylid enclosure server entry point.

mod bootstrap;
mod config;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "skylid.toml".to_string());
    let config = config::Config::from_path(Path::new(&path))
        .with_context(|| format!("loading configuration from {}", path))?;

    let (obs, closer) = bootstrap::build(&config)?;
    let weather_watch = bootstrap::spawn_weather_watch(
        Arc::clone(&closer),
        Duration::from_secs(config.server.weather_watch_secs),
    );
    tracing::info!("skylid server up");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutting down");

    weather_watch.abort();
    obs.telescope.polling_end().await;
    Ok(())
}

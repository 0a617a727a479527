//! questwatch: checks tracked Meta Quest apps for new versions.
//!
//! Usage:
//!   questwatch                # check now, then every check_interval_secs
//!   questwatch --single-run   # one check, then exit

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use questwatch::checker::{Checker, Driver};
use questwatch::config::Config;
use questwatch::meta::MetaClient;
use questwatch::notify::DiscordNotifier;
use questwatch::store::VersionStore;

const CONFIG_FILE: &str = "questwatch.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let single_run = std::env::args().skip(1).any(|a| a == "--single-run");

    let config_path = Path::new(CONFIG_FILE);
    let from_file = config_path.exists();
    let config = if from_file {
        Config::load(config_path).with_context(|| format!("failed to load {}", CONFIG_FILE))?
    } else {
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("questwatch v{} starting", env!("CARGO_PKG_VERSION"));
    if !from_file {
        info!("no {} found, using env-only config", CONFIG_FILE);
    }

    let store = VersionStore::load(&config.checker.state_file)
        .context("failed to load previous versions")?;

    let source = MetaClient::new(&config.meta).context("failed to build metadata client")?;
    let notifier = DiscordNotifier::new(&config.discord).context("failed to build webhook client")?;
    let checker = Checker::new(
        source,
        notifier,
        config.apps.clone(),
        Duration::from_secs(config.checker.request_delay_secs),
    );
    let mut driver = Driver::new(checker, store, &config.checker);

    if single_run {
        let updates = driver.run_single().await?;
        info!(updates = updates, "single check completed");
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested, finishing current check...");
            let _ = stop_tx.send(true);
        }
    });

    driver.run_continuous(stop_rx).await
}

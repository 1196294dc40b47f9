mod config;
mod error;
mod routing;
mod store;
mod sync;
mod telegram;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::store::git::GitStore;
use crate::store::{offset, RecordStore};
use crate::sync::{Cursor, Syncer};
use crate::telegram::TelegramPoller;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    let default_filter = std::env::var("TG2SITE_LOG_LEVEL")
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|_| "info,tg2site=debug".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None if std::env::var_os(config::CONF_CONTENT_ENV).is_some() => {
            info!("Loading configuration from environment");
            Config::from_env().context("Failed to load config from environment")?
        }
        None => {
            let path = PathBuf::from("config.toml");
            info!("Loading configuration from: {}", path.display());
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
    };

    info!("Configuration loaded successfully");
    info!("  Channel: {}", config.channel.id);
    info!("  Branch: {}", config.repository.branch);
    info!("  Messages dir: {}", config.repository.messages_dir.display());

    run(config).await
}

/// Clone, recover the cursor, then sync until something fails.
async fn run(config: Config) -> Result<()> {
    // Removed on exit; every start works from a fresh clone.
    let scratch = tempfile::Builder::new()
        .prefix("tg2site-")
        .tempdir()
        .context("Failed to create working directory")?;
    let worktree = scratch.path().join("repo");

    let store = GitStore::clone_into(&config.repository, &worktree).await?;
    info!("Working copy ready at {}", store.worktree().display());

    let cursor = Cursor::new(offset::recover_cursor(store.records_dir())?);
    info!("Recovered cursor: {}", cursor.last_persisted());

    let poller = TelegramPoller::new(&config.telegram)?;
    let syncer = Syncer::new(poller, store, config.channel.id);
    syncer.run(cursor).await?;

    Ok(())
}

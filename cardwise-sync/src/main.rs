//! Cardwise sync daemon
//!
//! Opens the local store, signs in, and runs the sync scheduler against the
//! configured remote store until interrupted.
//!
//! Usage:
//!   cardwise-syncd --config sync.json --account <uid>
//!   cardwise-syncd --offline

use anyhow::{Context, Result, bail};
use cardwise_cloud::{RemoteBackend, RemoteStore, RestRemoteStore};
use cardwise_sync::{Backend, SyncConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the password for `--email`.
const PASSWORD_ENV: &str = "CARDWISE_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "cardwise-syncd")]
#[command(about = "Cardwise local/remote sync daemon")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sign in as this account before syncing
    #[arg(short, long, conflicts_with = "offline")]
    account: Option<String>,

    /// Authenticate against the REST backend with this email
    #[arg(long, conflicts_with = "offline")]
    email: Option<String>,

    /// Use the offline account (local store only)
    #[arg(long)]
    offline: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = match &args.config {
        Some(path) => SyncConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SyncConfig::default(),
    };

    let backend = Backend::open(&config).context("failed to open local store")?;
    let remote = connect(&config, &args).await?;

    if args.offline {
        backend.sign_in_offline()?;
    } else if let Some(account) = remote.account.as_deref().or(args.account.as_deref()) {
        backend.sign_in(account)?;
    }

    match backend.user_id() {
        Ok(account) => info!("syncing account {account}"),
        Err(_) => warn!("no account signed in; the scheduler will idle"),
    }

    let handle = backend.spawn_sync(remote.store, config);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    if let Err(e) = handle.stop().await {
        warn!("scheduler already stopped: {e}");
    }
    Ok(())
}

struct Remote {
    store: Arc<dyn RemoteStore>,
    /// Account id learned from authentication.
    account: Option<String>,
}

async fn connect(config: &SyncConfig, args: &Args) -> Result<Remote> {
    let RemoteBackend::Rest(cloud) = &config.remote else {
        let store = cardwise_cloud::connect(&config.remote)?;
        return Ok(Remote {
            store,
            account: None,
        });
    };

    let rest = RestRemoteStore::new(cloud.clone()).context("failed to build REST client")?;
    let mut account = None;
    if let Some(email) = &args.email {
        let Ok(password) = std::env::var(PASSWORD_ENV) else {
            bail!("--email requires the {PASSWORD_ENV} environment variable");
        };
        let tokens = rest
            .authenticate(email, &password)
            .await
            .context("authentication failed")?;
        info!("authenticated as {}", tokens.email);
        account = Some(tokens.user_id);
    }

    Ok(Remote {
        store: Arc::new(rest),
        account,
    })
}

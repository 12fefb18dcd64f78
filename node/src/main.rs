use std::fs::OpenOptions;
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use flintcoin_core::Account;
use flintcoin_node::config::Config;
use flintcoin_node::names::NameService;
use flintcoin_node::server;
use flintcoin_node::state::{State, StateConfig};

#[derive(Parser)]
#[command(name = "flintcoin-node")]
#[command(about = "flintcoin blockchain node", long_about = None)]
struct Cli {
    /// Path to the node configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured "host:port".
    #[arg(long)]
    host: Option<String>,

    /// Override the configured miner account.
    #[arg(long)]
    miner: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(miner) = cli.miner {
        config.miner_account = miner;
    }

    let miner_account = Account::try_from_hex(&config.miner_account)
        .context("miner_account must be a 0x-prefixed 40 char hex account")?;

    // The storage layer refuses to invent the database, so create an empty
    // one on first run before the state opens it.
    if !config.db_path.exists() {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&config.db_path)
            .with_context(|| format!("creating {}", config.db_path.display()))?;
        info!("created empty block database at {}", config.db_path.display());
    }

    let sync_interval = match config.sync_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    info!("node starting: host {}, miner {}", config.host, miner_account);

    let state = State::new(StateConfig {
        miner_account,
        host: config.host.clone(),
        db_path: config.db_path.clone(),
        genesis_path: config.genesis_path.clone(),
        known_peers: config.known_peers.clone(),
        mempool_max: config.mempool_max,
        strict_block_apply: config.strict_block_apply,
        sync_interval,
    })
    .await?;

    let names = Arc::new(NameService::new(&config.accounts_dir));

    let addr = config
        .host
        .to_socket_addrs()
        .with_context(|| format!("resolving {}", config.host))?
        .next()
        .context("host resolved to no address")?;

    tokio::select! {
        _ = server::run_server(state.clone(), names, addr) => {}
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    state.shutdown().await;

    Ok(())
}

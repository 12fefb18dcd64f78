use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use flintcoin_core::mempool::DEFAULT_MAX_SIZE;

/// Node configuration, loaded from a JSON file with every field optional.
/// Genesis is deliberately a separate file: this record is operator tuning,
/// genesis is chain identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Externally reachable "host:port" for this node; also used to keep
    /// ourselves out of the known-peers list.
    pub host: String,
    /// Append-only block database file.
    pub db_path: PathBuf,
    /// Genesis record with starting balances and the mining economy.
    pub genesis_path: PathBuf,
    /// Account credited with rewards for blocks this node mines.
    pub miner_account: String,
    /// Hosts to pull from at startup and on the sync ticker.
    pub known_peers: Vec<String>,
    /// Directory of `<name>.ecdsa` key files used to label accounts.
    pub accounts_dir: PathBuf,
    /// Bound on pending transactions.
    pub mempool_max: usize,
    /// Reject a whole block when any of its transactions fails to apply.
    pub strict_block_apply: bool,
    /// Seconds between peer sync passes; 0 disables the ticker.
    pub sync_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host: "localhost:8080".to_string(),
            db_path: PathBuf::from("data/blocks.db"),
            genesis_path: PathBuf::from("data/genesis.json"),
            miner_account: String::new(),
            known_peers: Vec::new(),
            accounts_dir: PathBuf::from("data/accounts"),
            mempool_max: DEFAULT_MAX_SIZE,
            strict_block_apply: false,
            sync_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load from a JSON file; no path yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                let config = serde_json::from_str(&data)
                    .with_context(|| format!("parsing config {}", path.display()))?;
                Ok(config)
            }
            None => Ok(Config::default()),
        }
    }
}

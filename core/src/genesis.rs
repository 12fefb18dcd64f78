use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::CoreError;

/// Immutable chain configuration: starting balances and the mining economy.
/// Loaded once at startup and shared by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    /// Leading zero hex chars a block hash must carry.
    pub difficulty: u32,
    /// Number of pending transactions that triggers mining.
    pub trans_per_block: usize,
    /// Gas charged per transaction at admission time.
    pub gas_price: u64,
    /// Reward credited to the miner per committed block.
    pub mining_reward: u64,
    /// Balances granted to the founders of the chain.
    pub balances: HashMap<Account, u64>,
}

impl Genesis {
    /// Load and validate the genesis record from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Genesis, CoreError> {
        let data = fs::read_to_string(path)?;
        let genesis: Genesis = serde_json::from_str(&data)?;
        genesis.validate()?;
        Ok(genesis)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.difficulty == 0 || self.difficulty > 64 {
            return Err(CoreError::Genesis(format!(
                "difficulty {} out of range 1..=64",
                self.difficulty
            )));
        }
        if self.trans_per_block == 0 {
            return Err(CoreError::Genesis("trans_per_block must be at least 1".to_string()));
        }
        Ok(())
    }
}

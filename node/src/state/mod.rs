//! The state coordinator: the single point of mutation for the ledger. Every
//! commit, whether mined locally or received from a peer, updates storage,
//! the accounts ledger, the latest-block pointer and the mempool atomically
//! under one mutex. Mempool admission and all reads run outside that mutex.

pub mod pow;
pub mod sync;
pub mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{info, warn};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use flintcoin_core::{
    is_hash_solved, Account, Accounts, Block, BlockFS, BlockTx, CoreError, Genesis, Info, Mempool,
    Peer, PeerSet, SignedTx, Storage,
};

use crate::state::worker::Worker;

/// Sentinel meaning "the current highest block number" in block queries.
pub const QUERY_LATEST: u64 = u64::MAX >> 1;

/// Errors raised by the coordinator.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("not enough transactions in mempool")]
    NotEnoughTransactions,

    #[error("blockchain forked, start resync")]
    ChainForked,

    #[error("{hash} invalid hash")]
    InvalidHash { hash: String },

    #[error("this block is not the next number, got {got}, exp {expected}")]
    WrongNumber { got: u64, expected: u64 },

    #[error("parent hash doesn't match our latest block, got {got}, exp {expected}")]
    ParentMismatch { got: String, expected: String },

    #[error("mining cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Configuration required to start the node state.
#[derive(Clone)]
pub struct StateConfig {
    pub miner_account: Account,
    pub host: String,
    pub db_path: PathBuf,
    pub genesis_path: PathBuf,
    pub known_peers: Vec<String>,
    pub mempool_max: usize,
    /// Reject a whole block when any of its transactions fails to apply.
    /// When false, failures are logged and the block commits anyway.
    pub strict_block_apply: bool,
    /// How often the peer synchronizer re-runs; None disables the ticker.
    pub sync_interval: Option<Duration>,
}

/// Manages the blockchain database and the workers mutating it.
pub struct State {
    miner_account: Account,
    host: String,
    strict_block_apply: bool,

    genesis: Genesis,
    storage: Storage,
    mempool: Mempool,
    accounts: Accounts,
    known_peers: PeerSet,

    /// The coordinator mutex. Holding it is the commit critical section.
    latest_block: Mutex<Block>,

    worker: OnceCell<Worker>,
}

impl State {
    /// Load genesis, open storage, replay the chain into a fresh ledger and
    /// start the worker. The handle is shared with the HTTP layer by cloning
    /// the Arc; there is no global state.
    pub async fn new(cfg: StateConfig) -> Result<Arc<State>, StateError> {
        let genesis = Genesis::load(&cfg.genesis_path)?;
        let storage = Storage::open(&cfg.db_path)?;
        let blocks = storage.read_all()?;

        // Balances are the deterministic replay of every stored block applied
        // in order atop genesis. Per-tx failures follow the commit policy.
        let accounts = Accounts::new(genesis.clone());
        for block in &blocks {
            for tx in &block.transactions {
                if let Err(err) = accounts.apply_transaction(&block.header.miner_account, tx) {
                    warn!("state: replay: block {}: {err}", block.header.number);
                }
            }
            accounts.apply_mining_reward(&block.header.miner_account);
        }

        let latest_block = blocks.last().cloned().unwrap_or_default();
        info!(
            "state: loaded {} blocks, latest number {}",
            blocks.len(),
            latest_block.header.number
        );

        let state = Arc::new(State {
            miner_account: cfg.miner_account,
            host: cfg.host,
            strict_block_apply: cfg.strict_block_apply,
            genesis,
            storage,
            mempool: Mempool::new(cfg.mempool_max),
            accounts,
            known_peers: PeerSet::from_hosts(cfg.known_peers),
            latest_block: Mutex::new(latest_block),
            worker: OnceCell::new(),
        });

        worker::run(&state, cfg.sync_interval).await;

        Ok(state)
    }

    /// Cleanly bring the node down. Storage is released on drop.
    pub async fn shutdown(&self) {
        self.worker().shutdown().await;
    }

    pub(crate) fn register_worker(&self, worker: Worker) {
        if self.worker.set(worker).is_err() {
            warn!("state: worker already registered");
        }
    }

    pub(crate) fn worker(&self) -> &Worker {
        self.worker.get().expect("worker is registered at startup")
    }

    // ------------------------------------------------------------------
    // Write operations

    /// Accept a transaction from a wallet for inclusion in a future block.
    pub fn submit_wallet_transaction(&self, signed_tx: SignedTx) -> Result<(), StateError> {
        signed_tx.validate()?;

        let tx = BlockTx::new(signed_tx, self.genesis.gas_price);
        let count = self.mempool.upsert(tx)?;

        if count >= self.genesis.trans_per_block {
            self.worker().signal_start_mining();
        }

        Ok(())
    }

    /// Accept a transaction pushed by a peer node. The gas charge was fixed
    /// by the node that admitted it.
    pub fn submit_node_transaction(&self, tx: BlockTx) -> Result<(), StateError> {
        tx.signed.validate()?;

        let count = self.mempool.upsert(tx)?;
        if count >= self.genesis.trans_per_block {
            self.worker().signal_start_mining();
        }

        Ok(())
    }

    /// Attempt to create the next block in the chain. The PoW search honors
    /// the token; on success the block is committed atomically. Returns the
    /// block and how long the attempt took.
    pub async fn mine_new_block(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Block, Duration), StateError> {
        let started = Instant::now();

        if self.mempool.count() < self.genesis.trans_per_block {
            return Err(StateError::NotEnoughTransactions);
        }

        let transactions = self.mempool.pick_best(self.genesis.trans_per_block);
        let mut block = Block::new(
            self.miner_account.clone(),
            self.genesis.difficulty,
            &self.retrieve_latest_block(),
            transactions,
        );

        // Speculatively apply the candidate on a clone so a losing PoW race
        // never touches live balances.
        let staged = self.accounts.clone();
        for tx in &block.transactions {
            if let Err(err) = staged.apply_transaction(&self.miner_account, tx) {
                if self.strict_block_apply {
                    return Err(err.into());
                }
                warn!("state: mine: tx left in block without ledger update: {err}");
            }
        }
        staged.apply_mining_reward(&self.miner_account);

        // Header totals cover every included transaction so the header is
        // identical on every node regardless of local ledger state.
        block.header.total_tip = block.transactions.iter().map(|tx| tx.signed.tx.tip).sum();
        block.header.total_gas = block.transactions.iter().map(|tx| tx.gas).sum();

        let block_fs = pow::perform_pow(cancel, self.genesis.difficulty, block).await?;

        // One more check before touching state; a peer block may have won.
        if cancel.is_cancelled() {
            return Err(StateError::Cancelled);
        }

        self.commit(&block_fs, Some(staged))?;

        Ok((block_fs.block, started.elapsed()))
    }

    /// Take a block received from a peer, validate it, and commit it. The
    /// cancel rendezvous is held for the whole call so the mining worker
    /// cannot start a fresh attempt until our state changes are complete.
    pub fn write_peer_block(&self, block: Block) -> Result<(), StateError> {
        let _done = self.worker().signal_cancel_mining();

        let hash = self.validate_block(&block)?;

        let staged = if self.strict_block_apply {
            let staged = self.accounts.clone();
            for tx in &block.transactions {
                staged.apply_transaction(&block.header.miner_account, tx)?;
            }
            staged.apply_mining_reward(&block.header.miner_account);
            Some(staged)
        } else {
            None
        };

        self.commit(&BlockFS { hash, block }, staged)
    }

    /// The commit critical section: storage append, ledger update, latest
    /// pointer and mempool deletes, all while holding the coordinator mutex.
    fn commit(&self, block_fs: &BlockFS, staged: Option<Accounts>) -> Result<(), StateError> {
        let mut latest = self.latest_block.lock().unwrap();

        self.storage.write(block_fs)?;

        match staged {
            Some(staged) => self.accounts.replace(staged),
            None => {
                for tx in &block_fs.block.transactions {
                    let miner = &block_fs.block.header.miner_account;
                    if let Err(err) = self.accounts.apply_transaction(miner, tx) {
                        warn!("state: commit: block {}: {err}", block_fs.block.header.number);
                    }
                }
                self.accounts.apply_mining_reward(&block_fs.block.header.miner_account);
            }
        }

        *latest = block_fs.block.clone();

        for tx in &block_fs.block.transactions {
            if let Err(err) = self.mempool.delete(tx) {
                warn!("state: commit: mempool delete: {err}");
            }
        }

        info!(
            "state: commit: block {} [{}] with {} txs",
            block_fs.block.header.number,
            block_fs.hash,
            block_fs.block.transactions.len()
        );

        Ok(())
    }

    /// Validate a block for inclusion. Checks run in order; the first failure
    /// is returned.
    fn validate_block(&self, block: &Block) -> Result<String, StateError> {
        let hash = block.hash();
        if !is_hash_solved(self.genesis.difficulty, &hash) {
            return Err(StateError::InvalidHash { hash });
        }

        let latest = self.retrieve_latest_block();
        let next_number = latest.header.number + 1;

        // A peer two or more blocks ahead of us means the chain has forked
        // and we are on the wrong side. Report it; there is no auto-recovery.
        if block.header.number >= latest.header.number + 2 {
            return Err(StateError::ChainForked);
        }

        if block.header.number != next_number {
            return Err(StateError::WrongNumber {
                got: block.header.number,
                expected: next_number,
            });
        }

        if block.header.parent_hash != latest.hash() {
            return Err(StateError::ParentMismatch {
                got: block.header.parent_hash.clone(),
                expected: latest.hash(),
            });
        }

        for tx in &block.transactions {
            tx.signed.validate()?;
        }

        Ok(hash)
    }

    // ------------------------------------------------------------------
    // Read operations. All return independent snapshots and never take the
    // coordinator mutex beyond the brief latest-block copy.

    pub fn retrieve_mempool(&self) -> Vec<BlockTx> {
        self.mempool.copy()
    }

    pub fn retrieve_genesis(&self) -> Genesis {
        self.genesis.clone()
    }

    pub fn retrieve_accounts(&self) -> HashMap<Account, Info> {
        self.accounts.copy()
    }

    pub fn retrieve_latest_block(&self) -> Block {
        self.latest_block.lock().unwrap().clone()
    }

    pub fn retrieve_known_peers(&self) -> Vec<Peer> {
        self.known_peers.copy(&self.host)
    }

    pub fn query_mempool_length(&self) -> usize {
        self.mempool.count()
    }

    /// Blocks in the inclusive number range, read back from disk. Passing
    /// QUERY_LATEST as `from` resolves both endpoints to the current top.
    pub fn query_blocks_by_number(&self, from: u64, to: u64) -> Vec<Block> {
        let blocks = match self.storage.read_all() {
            Ok(blocks) => blocks,
            Err(err) => {
                warn!("state: query blocks: {err}");
                return Vec::new();
            }
        };

        let (from, to) = if from == QUERY_LATEST {
            let top = blocks.last().map(|block| block.header.number).unwrap_or(0);
            (top, top)
        } else {
            (from, to)
        };

        blocks
            .into_iter()
            .filter(|block| block.header.number >= from && block.header.number <= to)
            .collect()
    }

    pub fn genesis(&self) -> &Genesis {
        &self.genesis
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn miner_account(&self) -> &Account {
        &self.miner_account
    }

    /// Add a peer to the known set, ignoring ourselves. Returns true when the
    /// peer was new.
    pub fn add_peer(&self, peer: Peer) -> bool {
        if peer.matches(&self.host) {
            return false;
        }
        self.known_peers.add(peer)
    }
}

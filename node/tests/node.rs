//! End-to-end coordinator scenarios: submit/mine flows, peer block
//! validation, and the restart replay property. Each test gets its own
//! temporary database and genesis file.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secp256k1::{Secp256k1, SecretKey};
use tempfile::TempDir;

use flintcoin_core::{is_hash_solved, Account, Block, SignedTx, UserTx};
use flintcoin_node::state::{State, StateConfig, StateError};

const FUNDED_BALANCE: u64 = 100_000;
const GAS_PRICE: u64 = 5;
const MINING_REWARD: u64 = 700;

struct Fixture {
    dir: TempDir,
    secret_key: SecretKey,
    sender: Account,
    miner: Account,
    receiver: Account,
}

impl Fixture {
    fn new() -> Fixture {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());

        Fixture {
            dir: tempfile::tempdir().unwrap(),
            secret_key,
            sender: Account::from_public_key(&public_key),
            miner: Account::try_from_hex("0xcccccccccccccccccccccccccccccccccccccccc").unwrap(),
            receiver: Account::try_from_hex("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap(),
        }
    }

    fn write_genesis(&self, difficulty: u32, trans_per_block: usize) -> PathBuf {
        let path = self.dir.path().join("genesis.json");
        let raw = format!(
            r#"{{"difficulty":{difficulty},"trans_per_block":{trans_per_block},"gas_price":{GAS_PRICE},"mining_reward":{MINING_REWARD},"balances":{{"{}":{FUNDED_BALANCE}}}}}"#,
            self.sender
        );
        std::fs::write(&path, raw).unwrap();
        path
    }

    async fn state(&self, difficulty: u32, trans_per_block: usize) -> Arc<State> {
        let db_path = self.dir.path().join("blocks.db");
        if !db_path.exists() {
            File::create(&db_path).unwrap();
        }

        State::new(StateConfig {
            miner_account: self.miner.clone(),
            host: "localhost:18080".to_string(),
            db_path,
            genesis_path: self.write_genesis(difficulty, trans_per_block),
            known_peers: Vec::new(),
            mempool_max: 64,
            strict_block_apply: false,
            sync_interval: None,
        })
        .await
        .unwrap()
    }

    fn transfer(&self, nonce: u64, value: u64, tip: u64) -> SignedTx {
        UserTx::new(nonce, self.receiver.clone(), value, tip, Vec::new())
            .sign(&self.secret_key)
            .unwrap()
    }
}

/// Brute-force a header nonce until the block hash meets the difficulty. Only
/// used to fabricate peer blocks in tests; difficulty stays tiny.
fn solve(mut block: Block, difficulty: u32) -> Block {
    loop {
        if is_hash_solved(difficulty, &block.hash()) {
            return block;
        }
        block.header.nonce += 1;
    }
}

async fn wait_for_block(state: &Arc<State>, number: u64) {
    for _ in 0..200 {
        if state.retrieve_latest_block().header.number >= number {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("block {number} never appeared");
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_below_threshold_does_not_mine() {
    let fx = Fixture::new();
    let state = fx.state(1, 2).await;

    state.submit_wallet_transaction(fx.transfer(1, 100, 10)).unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(state.retrieve_mempool().len(), 1);
    assert_eq!(state.retrieve_latest_block().header.number, 0);

    state.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn mine_on_threshold_then_replay_on_restart() {
    let fx = Fixture::new();
    let state = fx.state(1, 2).await;

    state.submit_wallet_transaction(fx.transfer(1, 100, 10)).unwrap();
    state.submit_wallet_transaction(fx.transfer(2, 200, 20)).unwrap();

    wait_for_block(&state, 1).await;

    // The latest pointer moves before the commit's mempool deletes, so give
    // the tail of the critical section a moment to drain.
    for _ in 0..100 {
        if state.retrieve_mempool().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.retrieve_mempool().len(), 0);

    let accounts = state.retrieve_accounts();
    let fees = 2 * GAS_PRICE + 10 + 20;
    assert_eq!(accounts[&fx.miner].balance, MINING_REWARD + fees);
    assert_eq!(accounts[&fx.receiver].balance, 300);
    assert_eq!(accounts[&fx.sender].balance, FUNDED_BALANCE - 300 - fees);
    assert_eq!(accounts[&fx.sender].nonce, 2);

    let latest = state.retrieve_latest_block();
    assert!(is_hash_solved(1, &latest.hash()));

    state.shutdown().await;

    // Reopen against the same database: balances must equal the replay.
    let reopened = fx.state(1, 2).await;
    assert_eq!(reopened.retrieve_latest_block().header.number, latest.header.number);
    assert_eq!(reopened.retrieve_latest_block().hash(), latest.hash());
    assert_eq!(reopened.retrieve_accounts(), accounts);

    reopened.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn nonce_replacement_keeps_one_entry() {
    let fx = Fixture::new();
    let state = fx.state(1, 10).await;

    state.submit_wallet_transaction(fx.transfer(5, 100, 1)).unwrap();
    state.submit_wallet_transaction(fx.transfer(5, 100, 5)).unwrap();

    let pending = state.retrieve_mempool();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].signed.tx.tip, 5);

    state.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_block_commits_and_pays_its_miner() {
    let fx = Fixture::new();
    let state = fx.state(1, 10).await;

    let peer_miner = Account::try_from_hex("0xdddddddddddddddddddddddddddddddddddddddd").unwrap();
    let block = solve(
        Block::new(peer_miner.clone(), 1, &state.retrieve_latest_block(), Vec::new()),
        1,
    );

    state.write_peer_block(block.clone()).unwrap();

    let latest = state.retrieve_latest_block();
    assert_eq!(latest.header.number, 1);
    assert_eq!(latest.hash(), block.hash());
    assert_eq!(state.retrieve_accounts()[&peer_miner].balance, MINING_REWARD);

    state.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn fork_is_reported_not_recovered() {
    let fx = Fixture::new();
    let state = fx.state(1, 10).await;

    let miner = fx.miner.clone();
    for ahead in [2u64, 3] {
        let mut block = Block::new(miner.clone(), 1, &state.retrieve_latest_block(), Vec::new());
        block.header.number = ahead;
        let block = solve(block, 1);

        assert!(matches!(state.write_peer_block(block), Err(StateError::ChainForked)));
    }

    // State unchanged.
    assert_eq!(state.retrieve_latest_block().header.number, 0);
    assert!(!state.retrieve_accounts().contains_key(&fx.miner));

    state.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_block_preempts_a_running_miner() {
    let fx = Fixture::new();

    // Difficulty 6 keeps the PoW search busy for far longer than the test
    // runs, so the worker is guaranteed to be mid-search when the peer block
    // arrives.
    let state = fx.state(6, 1).await;

    state.submit_wallet_transaction(fx.transfer(1, 100, 10)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The cancel rendezvous is signaled before validation, so even a block
    // that fails validation interrupts the search. The call must return while
    // the miner is still winding down, not deadlock against it.
    let result = state.write_peer_block(Block::default());
    assert!(matches!(result, Err(StateError::WrongNumber { .. })));

    assert_eq!(state.retrieve_latest_block().header.number, 0);
    assert_eq!(state.retrieve_mempool().len(), 1);

    // Shutdown joins the worker; a broken handshake would hang here.
    tokio::time::timeout(Duration::from_secs(10), state.shutdown())
        .await
        .expect("worker did not shut down after preemption");
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_and_mislinked_blocks_are_rejected() {
    let fx = Fixture::new();
    let state = fx.state(1, 10).await;

    // Number zero hashes to the zero hash, which trivially satisfies the
    // difficulty, so this exercises the wrong-number check.
    let stale = Block::default();
    assert!(matches!(
        state.write_peer_block(stale),
        Err(StateError::WrongNumber { got: 0, expected: 1 })
    ));

    let mut mislinked = Block::new(fx.miner.clone(), 1, &state.retrieve_latest_block(), Vec::new());
    mislinked.header.parent_hash = "ff".repeat(32);
    let mislinked = solve(mislinked, 1);
    assert!(matches!(
        state.write_peer_block(mislinked),
        Err(StateError::ParentMismatch { .. })
    ));

    let unsolved = Block::new(fx.miner.clone(), 1, &state.retrieve_latest_block(), Vec::new());
    if !is_hash_solved(1, &unsolved.hash()) {
        assert!(matches!(
            state.write_peer_block(unsolved),
            Err(StateError::InvalidHash { .. })
        ));
    }

    state.shutdown().await;
}

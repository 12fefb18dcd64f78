use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::CoreError;
use crate::transaction::BlockTx;

/// Default bound on pending transactions when the node config is silent.
pub const DEFAULT_MAX_SIZE: usize = 1024;

/// Cache of pending transactions keyed by `"{from}:{nonce}"`. A wallet may
/// revise the fee for a nonce before it is mined; the upsert replaces the
/// previous entry for that key.
pub struct Mempool {
    max_size: usize,
    pool: RwLock<HashMap<String, BlockTx>>,
}

impl Mempool {
    pub fn new(max_size: usize) -> Mempool {
        Mempool {
            max_size: max_size.max(1),
            pool: RwLock::new(HashMap::new()),
        }
    }

    /// Current number of pending transactions.
    pub fn count(&self) -> usize {
        self.pool.read().unwrap().len()
    }

    /// Add or replace a transaction, returning the resulting pool size. When
    /// the pool is full and the key is new, the lowest-tip entry is evicted;
    /// a newcomer that does not pay strictly more than the cheapest entry is
    /// rejected instead.
    pub fn upsert(&self, tx: BlockTx) -> Result<usize, CoreError> {
        let key = tx.unique_key()?;
        let mut pool = self.pool.write().unwrap();

        if !pool.contains_key(&key) && pool.len() >= self.max_size {
            let victim = pool
                .iter()
                .min_by(|(ka, a), (kb, b)| {
                    a.signed.tx.tip.cmp(&b.signed.tx.tip).then_with(|| ka.cmp(kb))
                })
                .map(|(k, v)| (k.clone(), v.signed.tx.tip));

            match victim {
                Some((_, victim_tip)) if tx.signed.tx.tip <= victim_tip => {
                    return Err(CoreError::MempoolFull);
                }
                Some((victim_key, _)) => {
                    pool.remove(&victim_key);
                }
                None => {}
            }
        }

        pool.insert(key, tx);
        Ok(pool.len())
    }

    /// Remove a transaction by key. Removing an absent entry is not an error.
    pub fn delete(&self, tx: &BlockTx) -> Result<(), CoreError> {
        let key = tx.unique_key()?;
        self.pool.write().unwrap().remove(&key);
        Ok(())
    }

    /// Copy of every pending transaction.
    pub fn copy(&self) -> Vec<BlockTx> {
        self.pool.read().unwrap().values().cloned().collect()
    }

    /// Deterministic selection for the next block: tip descending, ties
    /// broken by key ascending, so every node picks the same set from the
    /// same pool.
    pub fn pick_best(&self, how_many: usize) -> Vec<BlockTx> {
        let pool = self.pool.read().unwrap();

        let mut entries: Vec<(&String, &BlockTx)> = pool.iter().collect();
        entries.sort_by(|(ka, a), (kb, b)| {
            b.signed.tx.tip.cmp(&a.signed.tx.tip).then_with(|| ka.cmp(kb))
        });

        entries.into_iter().take(how_many).map(|(_, tx)| tx.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::transaction::UserTx;
    use secp256k1::{Secp256k1, SecretKey};

    fn keypair() -> SecretKey {
        let secp = Secp256k1::new();
        secp.generate_keypair(&mut rand::thread_rng()).0
    }

    fn receiver() -> Account {
        Account::try_from_hex("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap()
    }

    fn tx(secret_key: &SecretKey, nonce: u64, tip: u64) -> BlockTx {
        let user_tx = UserTx::new(nonce, receiver(), 10, tip, Vec::new());
        BlockTx::new(user_tx.sign(secret_key).unwrap(), 1)
    }

    #[test]
    fn upsert_is_idempotent() {
        let mempool = Mempool::new(DEFAULT_MAX_SIZE);
        let key = keypair();

        let t = tx(&key, 1, 0);
        assert_eq!(mempool.upsert(t.clone()).unwrap(), 1);
        assert_eq!(mempool.upsert(t).unwrap(), 1);
        assert_eq!(mempool.count(), 1);
    }

    #[test]
    fn same_nonce_replaces_the_entry() {
        let mempool = Mempool::new(DEFAULT_MAX_SIZE);
        let key = keypair();

        mempool.upsert(tx(&key, 5, 1)).unwrap();
        mempool.upsert(tx(&key, 5, 5)).unwrap();

        let pending = mempool.copy();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].signed.tx.tip, 5);
    }

    #[test]
    fn delete_is_idempotent() {
        let mempool = Mempool::new(DEFAULT_MAX_SIZE);
        let key = keypair();

        let t = tx(&key, 1, 0);
        mempool.upsert(t.clone()).unwrap();
        mempool.delete(&t).unwrap();
        mempool.delete(&t).unwrap();
        assert_eq!(mempool.count(), 0);
    }

    #[test]
    fn pick_best_orders_by_tip() {
        let mempool = Mempool::new(DEFAULT_MAX_SIZE);
        let key = keypair();

        mempool.upsert(tx(&key, 1, 2)).unwrap();
        mempool.upsert(tx(&key, 2, 9)).unwrap();
        mempool.upsert(tx(&key, 3, 4)).unwrap();

        let picked = mempool.pick_best(2);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].signed.tx.tip, 9);
        assert_eq!(picked[1].signed.tx.tip, 4);
    }

    #[test]
    fn full_pool_evicts_the_cheapest() {
        let mempool = Mempool::new(2);
        let key = keypair();

        mempool.upsert(tx(&key, 1, 1)).unwrap();
        mempool.upsert(tx(&key, 2, 5)).unwrap();

        // Pays less than the cheapest entry: rejected.
        assert!(matches!(mempool.upsert(tx(&key, 3, 1)), Err(CoreError::MempoolFull)));

        // Pays more: the tip-1 entry is evicted.
        mempool.upsert(tx(&key, 4, 3)).unwrap();
        let mut tips: Vec<u64> = mempool.copy().iter().map(|t| t.signed.tx.tip).collect();
        tips.sort_unstable();
        assert_eq!(tips, vec![3, 5]);

        // Replacing an existing key never counts against the cap.
        mempool.upsert(tx(&key, 4, 8)).unwrap();
        assert_eq!(mempool.count(), 2);
    }
}

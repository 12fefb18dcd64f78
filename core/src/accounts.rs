use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

use crate::account::Account;
use crate::error::CoreError;
use crate::genesis::Genesis;
use crate::transaction::BlockTx;

/// Per-account state tracked by the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Info {
    pub balance: u64,
    /// Highest transaction nonce applied from this account.
    pub nonce: u64,
}

/// Balance map derived from applied blocks, seeded from genesis. Accounts are
/// created implicitly on first receive and never destroyed.
pub struct Accounts {
    genesis: Genesis,
    info: RwLock<HashMap<Account, Info>>,
}

impl Accounts {
    pub fn new(genesis: Genesis) -> Accounts {
        let mut info = HashMap::new();
        for (account, balance) in &genesis.balances {
            info.insert(account.clone(), Info { balance: *balance, nonce: 0 });
        }

        Accounts { genesis, info: RwLock::new(info) }
    }

    /// Snapshot of every account, for the read APIs.
    pub fn copy(&self) -> HashMap<Account, Info> {
        self.info.read().unwrap().clone()
    }

    /// Swap in the contents of a prepared ledger atomically. Used after a
    /// mined block was speculatively applied to a clone.
    pub fn replace(&self, other: Accounts) {
        let staged = other.info.into_inner().unwrap();
        *self.info.write().unwrap() = staged;
    }

    /// Apply the balance changes for one transaction: the sender pays
    /// value + gas + tip, the receiver gains value, the miner gains the fee.
    /// All edits happen under one write lock; on error nothing changes.
    pub fn apply_transaction(&self, miner_account: &Account, tx: &BlockTx) -> Result<(), CoreError> {
        let from = tx.from_account()?;
        let to = &tx.signed.tx.to;

        if from == *to {
            return Err(CoreError::SelfTransfer {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let fee = tx.gas.saturating_add(tx.signed.tx.tip);
        let cost = tx.signed.tx.value.saturating_add(fee);

        let mut info = self.info.write().unwrap();

        let mut from_info = info.get(&from).copied().unwrap_or_default();
        if cost > from_info.balance {
            return Err(CoreError::InsufficientBalance { account: from.to_string() });
        }

        from_info.balance -= cost;
        from_info.nonce = from_info.nonce.max(tx.signed.tx.nonce);
        info.insert(from, from_info);

        info.entry(to.clone()).or_default().balance += tx.signed.tx.value;
        info.entry(miner_account.clone()).or_default().balance += fee;

        Ok(())
    }

    /// Credit the configured mining reward.
    pub fn apply_mining_reward(&self, miner_account: &Account) {
        let mut info = self.info.write().unwrap();
        info.entry(miner_account.clone()).or_default().balance += self.genesis.mining_reward;
    }
}

impl Clone for Accounts {
    /// Deep copy producing an independently mutable ledger. Miners use this
    /// to pre-validate a candidate block without touching live state.
    fn clone(&self) -> Accounts {
        Accounts {
            genesis: self.genesis.clone(),
            info: RwLock::new(self.copy()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::UserTx;
    use secp256k1::{Secp256k1, SecretKey};

    fn account(fill: char) -> Account {
        Account::try_from_hex(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    fn keypair() -> (SecretKey, Account) {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());
        (secret_key, Account::from_public_key(&public_key))
    }

    fn genesis_with(balances: Vec<(Account, u64)>) -> Genesis {
        Genesis {
            difficulty: 1,
            trans_per_block: 2,
            gas_price: 5,
            mining_reward: 100,
            balances: balances.into_iter().collect(),
        }
    }

    fn signed_transfer(secret_key: &SecretKey, to: Account, nonce: u64, value: u64, tip: u64) -> BlockTx {
        let tx = UserTx::new(nonce, to, value, tip, Vec::new());
        BlockTx::new(tx.sign(secret_key).unwrap(), 5)
    }

    #[test]
    fn apply_moves_value_and_fees() {
        let (secret_key, sender) = keypair();
        let receiver = account('b');
        let miner = account('c');

        let accounts = Accounts::new(genesis_with(vec![(sender.clone(), 1_000)]));
        let tx = signed_transfer(&secret_key, receiver.clone(), 1, 200, 10);

        accounts.apply_transaction(&miner, &tx).unwrap();

        let snapshot = accounts.copy();
        assert_eq!(snapshot[&sender], Info { balance: 1_000 - 200 - 5 - 10, nonce: 1 });
        assert_eq!(snapshot[&receiver].balance, 200);
        assert_eq!(snapshot[&miner].balance, 15);
    }

    #[test]
    fn insufficient_balance_changes_nothing() {
        let (secret_key, sender) = keypair();
        let miner = account('c');

        let accounts = Accounts::new(genesis_with(vec![(sender.clone(), 100)]));
        let tx = signed_transfer(&secret_key, account('b'), 1, 200, 0);

        assert!(matches!(
            accounts.apply_transaction(&miner, &tx),
            Err(CoreError::InsufficientBalance { .. })
        ));

        let snapshot = accounts.copy();
        assert_eq!(snapshot[&sender].balance, 100);
        assert!(!snapshot.contains_key(&account('b')));
        assert!(!snapshot.contains_key(&miner));
    }

    #[test]
    fn self_transfer_is_rejected() {
        let (secret_key, sender) = keypair();
        let accounts = Accounts::new(genesis_with(vec![(sender.clone(), 1_000)]));

        let tx = signed_transfer(&secret_key, sender, 1, 10, 0);
        assert!(matches!(
            accounts.apply_transaction(&account('c'), &tx),
            Err(CoreError::SelfTransfer { .. })
        ));
    }

    #[test]
    fn clone_is_independent_and_replace_swaps() {
        let (secret_key, sender) = keypair();
        let miner = account('c');
        let accounts = Accounts::new(genesis_with(vec![(sender.clone(), 1_000)]));

        let staged = accounts.clone();
        let tx = signed_transfer(&secret_key, account('b'), 1, 100, 0);
        staged.apply_transaction(&miner, &tx).unwrap();
        staged.apply_mining_reward(&miner);

        // Live ledger untouched until the swap.
        assert_eq!(accounts.copy()[&sender].balance, 1_000);

        accounts.replace(staged);
        let snapshot = accounts.copy();
        assert_eq!(snapshot[&sender].balance, 1_000 - 100 - 5);
        assert_eq!(snapshot[&miner].balance, 105);
    }

    #[test]
    fn mining_reward_credits_the_miner() {
        let accounts = Accounts::new(genesis_with(Vec::new()));
        let miner = account('c');

        accounts.apply_mining_reward(&miner);
        accounts.apply_mining_reward(&miner);
        assert_eq!(accounts.copy()[&miner].balance, 200);
    }
}

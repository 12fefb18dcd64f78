//! Core data model for the flintcoin blockchain: accounts, signatures,
//! transactions, blocks, the append-only storage log, the mempool and the
//! genesis record. Everything here is synchronous; the node crate owns the
//! runtime, the coordinator and the network surface.

pub mod account;
pub mod accounts;
pub mod block;
pub mod error;
pub mod genesis;
pub mod mempool;
pub mod peer;
pub mod signature;
pub mod storage;
pub mod transaction;

pub use account::Account;
pub use accounts::{Accounts, Info};
pub use block::{is_hash_solved, Block, BlockFS, BlockHeader};
pub use error::CoreError;
pub use genesis::Genesis;
pub use mempool::Mempool;
pub use peer::{Peer, PeerSet, PeerStatus};
pub use storage::Storage;
pub use transaction::{BlockTx, SignedTx, UserTx};

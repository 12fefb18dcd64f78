//! flintcoin node: the state coordinator that guards the ledger, the mining
//! worker and peer synchronizer built around it, and the HTTP surface that
//! exposes them.

pub mod config;
pub mod names;
pub mod server;
pub mod state;

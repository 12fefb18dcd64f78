use thiserror::Error;

/// Errors raised by the core data model.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid transaction, sending money to yourself, from {from}, to {to}")]
    SelfTransfer { from: String, to: String },

    #[error("{account} has an insufficient balance")]
    InsufficientBalance { account: String },

    #[error("mempool is full and the transaction does not pay a better tip")]
    MempoolFull,

    #[error("block {index} has been changed")]
    TamperedBlock { index: usize },

    #[error("invalid genesis: {0}")]
    Genesis(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::CoreError;
use crate::signature;

/// The transactional payload authored and signed by a wallet. The sender is
/// never part of the payload; it is recovered from the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTx {
    pub nonce: u64,
    pub to: Account,
    pub value: u64,
    pub tip: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl UserTx {
    pub fn new(nonce: u64, to: Account, value: u64, tip: u64, data: Vec<u8>) -> UserTx {
        UserTx { nonce, to, value, tip, data }
    }

    /// Sign the payload, producing the wire form a wallet submits.
    pub fn sign(&self, secret_key: &SecretKey) -> Result<SignedTx, CoreError> {
        let (v, r, s) = signature::sign(self, secret_key)?;
        Ok(SignedTx { tx: self.clone(), v, r, s })
    }
}

/// A user transaction plus its ECDSA triple. Serializes flat:
/// `{nonce, to, value, tip, data, v, r, s}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    #[serde(flatten)]
    pub tx: UserTx,
    pub v: u8,
    pub r: String,
    pub s: String,
}

impl SignedTx {
    /// The authoritative sender, recovered from the signature.
    pub fn from_account(&self) -> Result<Account, CoreError> {
        signature::recover(&self.tx, self.v, &self.r, &self.s)
    }

    /// Check the signature contract: v in range, r/s well formed, and the
    /// recovery yields a valid account.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.from_account().map(|_| ())
    }

    /// Compact rendering for logs.
    pub fn signature_string(&self) -> String {
        format!(
            "0x{:02x}{}{}",
            self.v,
            self.r.trim_start_matches("0x"),
            self.s.trim_start_matches("0x"),
        )
    }
}

/// A signed transaction as stored in blocks, with the gas charge fixed at
/// admission time from the genesis gas price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTx {
    #[serde(flatten)]
    pub signed: SignedTx,
    pub gas: u64,
}

impl BlockTx {
    pub fn new(signed: SignedTx, gas_price: u64) -> BlockTx {
        BlockTx { signed, gas: gas_price }
    }

    pub fn from_account(&self) -> Result<Account, CoreError> {
        self.signed.from_account()
    }

    /// Mempool key. One pending transaction per sender and nonce.
    pub fn unique_key(&self) -> Result<String, CoreError> {
        Ok(format!("{}:{}", self.from_account()?, self.signed.tx.nonce))
    }
}

/// Byte arrays travel as base64 strings in the canonical JSON encoding.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

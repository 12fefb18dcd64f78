use std::fs;
use std::path::Path;

use anyhow::Context;
use secp256k1::{Secp256k1, SecretKey};

use flintcoin_core::{Account, CoreError, SignedTx, UserTx};

/// A local key pair and the account it controls.
pub struct Wallet {
    pub secret_key: SecretKey,
    pub account: Account,
}

impl Wallet {
    /// Generate a fresh key pair.
    pub fn generate() -> Wallet {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());

        Wallet {
            secret_key,
            account: Account::from_public_key(&public_key),
        }
    }

    /// Load the hex-encoded private key stored at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Wallet> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading wallet {}", path.display()))?;
        let raw = raw.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);

        let bytes = hex::decode(raw).context("wallet file is not hex")?;
        let secret_key = SecretKey::from_slice(&bytes).context("wallet file is not a valid key")?;

        let secp = Secp256k1::new();
        let account = Account::from_public_key(&secret_key.public_key(&secp));

        Ok(Wallet { secret_key, account })
    }

    /// Save the private key as a hex file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.secret_hex())?;
        Ok(())
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Sign a user transaction with this wallet's key.
    pub fn sign(&self, tx: &UserTx) -> Result<SignedTx, CoreError> {
        tx.sign(&self.secret_key)
    }
}

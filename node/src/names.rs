use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::warn;
use secp256k1::{Secp256k1, SecretKey};

use flintcoin_core::Account;

/// Maps accounts to human names by scanning a directory of `<name>.ecdsa`
/// files, each holding a hex-encoded private key. Purely cosmetic: the
/// accounts API uses it to label balances.
pub struct NameService {
    names: HashMap<Account, String>,
}

impl NameService {
    /// Build the lookup from the key files under `dir`. A missing directory
    /// yields an empty service; a broken key file is skipped with a warning.
    pub fn new(dir: impl AsRef<Path>) -> NameService {
        let mut names = HashMap::new();

        let entries = match fs::read_dir(dir.as_ref()) {
            Ok(entries) => entries,
            Err(_) => return NameService { names },
        };

        let secp = Secp256k1::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "ecdsa") {
                continue;
            }
            let name = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            match load_secret_key(&path) {
                Ok(secret_key) => {
                    let account = Account::from_public_key(&secret_key.public_key(&secp));
                    names.insert(account, name);
                }
                Err(err) => warn!("names: skipping {}: {err}", path.display()),
            }
        }

        NameService { names }
    }

    /// The name registered for an account, or empty when unknown.
    pub fn lookup(&self, account: &Account) -> String {
        self.names.get(account).cloned().unwrap_or_default()
    }
}

fn load_secret_key(path: &Path) -> anyhow::Result<SecretKey> {
    let raw = fs::read_to_string(path)?;
    let raw = raw.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw)?;
    Ok(SecretKey::from_slice(&bytes)?)
}

use std::fmt;
use std::str::FromStr;

use secp256k1::PublicKey;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tiny_keccak::{Hasher, Keccak};

use crate::error::CoreError;

/// Textual form: "0x" + 40 hex chars (20 bytes).
const ACCOUNT_LEN: usize = 42;

/// An account identifier derived from the public key that verifies a
/// signature. Stored in its canonical lowercase hex rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Account(String);

impl Account {
    /// Parse and validate the textual form, normalizing to lowercase.
    pub fn try_from_hex(value: &str) -> Result<Account, CoreError> {
        let lower = value.to_lowercase();
        if lower.len() != ACCOUNT_LEN || !lower.starts_with("0x") {
            return Err(CoreError::InvalidAccount(value.to_string()));
        }
        if !lower[2..].bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(CoreError::InvalidAccount(value.to_string()));
        }
        Ok(Account(lower))
    }

    /// Address = 0x + last 20 bytes of keccak256 of the uncompressed public
    /// key (without its 0x04 prefix byte).
    pub fn from_public_key(public_key: &PublicKey) -> Account {
        let uncompressed = public_key.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        Account(format!("0x{}", hex::encode(&hash[12..])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Account {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Account, CoreError> {
        Account::try_from_hex(s)
    }
}

impl Serialize for Account {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Account, D::Error> {
        let value = String::deserialize(deserializer)?;
        Account::try_from_hex(&value).map_err(de::Error::custom)
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let hex40 = "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        let account = Account::try_from_hex(&format!("0x{hex40}")).unwrap();
        assert_eq!(account.as_str(), format!("0x{hex40}"));
    }

    #[test]
    fn normalizes_case() {
        let mixed = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        let account = Account::try_from_hex(mixed).unwrap();
        assert_eq!(account.as_str(), mixed.to_lowercase());
    }

    #[test]
    fn rejects_bad_forms() {
        assert!(Account::try_from_hex("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
        assert!(Account::try_from_hex("0x5aaeb6").is_err());
        assert!(Account::try_from_hex("0xzzzeb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
    }

    #[test]
    fn derives_from_public_key() {
        let secp = secp256k1::Secp256k1::new();
        let (_, public_key) = secp.generate_keypair(&mut rand::thread_rng());
        let account = Account::from_public_key(&public_key);
        assert_eq!(account.as_str().len(), ACCOUNT_LEN);
        assert!(account.as_str().starts_with("0x"));
    }
}

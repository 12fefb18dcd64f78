//! Hashing and ECDSA sign/recover contracts used everywhere a value must be
//! identified or attributed: transaction signing, block hashing, replay
//! verification. The digest is always sha256 over the value's canonical JSON
//! encoding (struct field order, decimal integers, base64 byte arrays), so
//! any two nodes produce byte-identical input to the hash.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::account::Account;
use crate::error::CoreError;

/// Hash of the implicit genesis block, and the "no block" sentinel.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Recovery ids are offset by this value so a flintcoin signature can never be
/// replayed on a chain using the plain 27/28 convention over the same curve.
/// Valid v values are therefore 29 and 30.
pub const RECOVERY_ID_OFFSET: u8 = 29;

/// Unique hex string for any serializable value.
pub fn hash<T: Serialize>(value: &T) -> String {
    match digest(value) {
        Ok(digest) => hex::encode(digest),
        Err(_) => ZERO_HASH.to_string(),
    }
}

/// Sign the value's digest, returning the (v, r, s) triple with r and s as
/// 0x-prefixed 32-byte hex words.
pub fn sign<T: Serialize>(value: &T, secret_key: &SecretKey) -> Result<(u8, String, String), CoreError> {
    let message = message(value)?;
    let secp = Secp256k1::new();
    let signature = secp.sign_ecdsa_recoverable(&message, secret_key);

    let (recovery_id, compact) = signature.serialize_compact();
    let v = recovery_id.to_i32() as u8 + RECOVERY_ID_OFFSET;
    let r = format!("0x{}", hex::encode(&compact[..32]));
    let s = format!("0x{}", hex::encode(&compact[32..]));

    Ok((v, r, s))
}

/// Recover the account that signed the value. This is the authoritative
/// sender of a transaction; a `from` field is never stored.
pub fn recover<T: Serialize>(value: &T, v: u8, r: &str, s: &str) -> Result<Account, CoreError> {
    let message = message(value)?;
    let signature = to_recoverable(v, r, s)?;

    let secp = Secp256k1::new();
    let public_key = secp
        .recover_ecdsa(&message, &signature)
        .map_err(|err| CoreError::InvalidSignature(err.to_string()))?;

    Ok(Account::from_public_key(&public_key))
}

fn digest<T: Serialize>(value: &T) -> Result<[u8; 32], CoreError> {
    let data = serde_json::to_vec(value)?;
    Ok(Sha256::digest(&data).into())
}

fn message<T: Serialize>(value: &T) -> Result<Message, CoreError> {
    let digest = digest(value)?;
    Message::from_digest_slice(&digest).map_err(|err| CoreError::InvalidSignature(err.to_string()))
}

fn to_recoverable(v: u8, r: &str, s: &str) -> Result<RecoverableSignature, CoreError> {
    if v != RECOVERY_ID_OFFSET && v != RECOVERY_ID_OFFSET + 1 {
        return Err(CoreError::InvalidSignature(format!("recovery id {v} out of range")));
    }

    let mut compact = [0u8; 64];
    decode_word(r, &mut compact[..32])?;
    decode_word(s, &mut compact[32..])?;

    let recovery_id = RecoveryId::from_i32(i32::from(v - RECOVERY_ID_OFFSET))
        .map_err(|err| CoreError::InvalidSignature(err.to_string()))?;

    RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|err| CoreError::InvalidSignature(err.to_string()))
}

fn decode_word(word: &str, out: &mut [u8]) -> Result<(), CoreError> {
    let word = word.strip_prefix("0x").unwrap_or(word);
    hex::decode_to_slice(word, out).map_err(|err| CoreError::InvalidSignature(err.to_string()))
}

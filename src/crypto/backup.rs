//! # Authenticated Backups
//!
//! ```text
//! blob = hex(HMAC-SHA256(key = SHA-256(secret), msg = ciphertext)) || ciphertext
//! ```
//!
//! The MAC is checked before anything is decrypted, so a wrong backup
//! password and a tampered file are both rejected up front. The MAC key is
//! SHA-256 of the secret, never the secret itself.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Length of the hex-encoded MAC prefix
pub const BACKUP_MAC_HEX_LEN: usize = 64;

fn backup_mac(ciphertext: &str, secret: &str) -> Result<HmacSha256> {
    let mac_key = Sha256::digest(secret.as_bytes());
    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|e| Error::KeyDerivationFailed(format!("Invalid HMAC key: {}", e)))?;
    mac.update(ciphertext.as_bytes());
    Ok(mac)
}

/// Prepend the HMAC of `ciphertext` keyed by SHA-256(`secret`)
pub fn generate_authenticated_backup(ciphertext: &str, secret: &str) -> Result<String> {
    let tag = backup_mac(ciphertext, secret)?.finalize().into_bytes();

    let mut blob = hex::encode(tag);
    blob.push_str(ciphertext);
    Ok(blob)
}

/// Check the MAC prefix of `blob` and return the ciphertext portion
///
/// ## Errors
///
/// `NotAuthentic` if the blob is too short, the prefix isn't hex, or the
/// recomputed MAC differs.
pub fn verify_and_strip(blob: &str, secret: &str) -> Result<String> {
    let (tag_hex, ciphertext) = match (blob.get(..BACKUP_MAC_HEX_LEN), blob.get(BACKUP_MAC_HEX_LEN..)) {
        (Some(tag), Some(rest)) => (tag, rest),
        _ => return Err(Error::NotAuthentic),
    };

    let tag = hex::decode(tag_hex).map_err(|_| Error::NotAuthentic)?;

    backup_mac(ciphertext, secret)?
        .verify_slice(&tag)
        .map_err(|_| Error::NotAuthentic)?;

    Ok(ciphertext.to_string())
}

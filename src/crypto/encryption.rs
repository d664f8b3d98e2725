//! # Encryption Module
//!
//! AES-256-GCM encryption of string payloads under a secret.
//!
//! ## Ciphertext Layout
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────────────────┐
//! │  salt (16)   │  nonce (12)  │  ciphertext || auth tag (16)         │
//! └──────────────┴──────────────┴──────────────────────────────────────┘
//!                    base64 (standard alphabet) on the wire
//! ```
//!
//! The result is a self-contained string, so a stored value can be moved
//! between key-value slots and backups without extra framing.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce as AesNonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::kdf::{derive_key, domain, SALT_SIZE};
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Which key domain a payload is encrypted under
///
/// Callers must decrypt with the mode they encrypted with. Mixing modes
/// yields an undecryptable payload; nothing at runtime checks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionMode {
    /// Password verifier, approvals and other settings
    Settings,
    /// Identity-bearing data such as connections
    Identity,
}

impl EncryptionMode {
    fn domain(self) -> &'static [u8] {
        match self {
            EncryptionMode::Settings => domain::SETTINGS,
            EncryptionMode::Identity => domain::IDENTITY,
        }
    }
}

/// Encrypt `plaintext` under `secret`
///
/// A fresh salt and nonce are drawn for every call, so encrypting the same
/// plaintext twice produces different ciphertexts.
pub fn encrypt(plaintext: &str, secret: &str, mode: EncryptionMode) -> Result<String> {
    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let key = derive_key(secret.as_bytes(), &salt, mode.domain())?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(out))
}

/// Decrypt a payload produced by [`encrypt`]
///
/// ## Errors
///
/// Returns `DecryptionFailed` if the input is malformed, or if the secret or
/// mode differ from the ones used for encryption. Callers that need to tell
/// a wrong password apart check the result against a known plaintext.
pub fn decrypt(ciphertext: &str, secret: &str, mode: EncryptionMode) -> Result<String> {
    let data = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| Error::DecryptionFailed(format!("Invalid encoding: {}", e)))?;

    if data.len() < SALT_SIZE + NONCE_SIZE {
        return Err(Error::DecryptionFailed("Ciphertext too short".into()));
    }

    let (salt, rest) = data.split_at(SALT_SIZE);
    let (nonce, body) = rest.split_at(NONCE_SIZE);

    let key = derive_key(secret.as_bytes(), salt, mode.domain())?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;

    let plaintext = cipher
        .decrypt(AesNonce::from_slice(nonce), body)
        .map_err(|_| Error::DecryptionFailed("authentication tag mismatch".into()))?;

    String::from_utf8(plaintext)
        .map_err(|_| Error::DecryptionFailed("Plaintext is not valid UTF-8".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_basic() {
        let ciphertext = encrypt("Hello, World!", "secret", EncryptionMode::Settings).unwrap();
        let plaintext = decrypt(&ciphertext, "secret", EncryptionMode::Settings).unwrap();

        assert_eq!(plaintext, "Hello, World!");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let ciphertext = encrypt("", "secret", EncryptionMode::Identity).unwrap();
        let plaintext = decrypt(&ciphertext, "secret", EncryptionMode::Identity).unwrap();

        assert_eq!(plaintext, "");
    }

    #[test]
    fn test_wrong_secret_fails() {
        let ciphertext = encrypt("data", "secret", EncryptionMode::Settings).unwrap();

        assert!(decrypt(&ciphertext, "other", EncryptionMode::Settings).is_err());
    }

    #[test]
    fn test_mixed_modes_fail() {
        let ciphertext = encrypt("data", "secret", EncryptionMode::Settings).unwrap();

        assert!(decrypt(&ciphertext, "secret", EncryptionMode::Identity).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let ciphertext = encrypt("data", "secret", EncryptionMode::Settings).unwrap();
        let mut raw = STANDARD.decode(&ciphertext).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;

        let tampered = STANDARD.encode(raw);
        assert!(decrypt(&tampered, "secret", EncryptionMode::Settings).is_err());
    }

    #[test]
    fn test_garbage_input_fails() {
        assert!(decrypt("not base64!", "secret", EncryptionMode::Settings).is_err());
        assert!(decrypt("AAAA", "secret", EncryptionMode::Settings).is_err());
    }

    #[test]
    fn test_random_salt_and_nonce() {
        let ct1 = encrypt("same", "secret", EncryptionMode::Settings).unwrap();
        let ct2 = encrypt("same", "secret", EncryptionMode::Settings).unwrap();

        assert_ne!(ct1, ct2);
    }
}

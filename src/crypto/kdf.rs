//! # Key Derivation
//!
//! Derives AES-256-GCM keys from the session secret.
//!
//! ```text
//! HKDF-SHA256(
//!   ikm  = session secret bytes,
//!   salt = 16 random bytes stored with the ciphertext,
//!   info = domain string of the encryption mode
//! ) → 32-byte key
//! ```
//!
//! The two encryption modes use different `info` strings, so a ciphertext
//! written in one mode never decrypts in the other.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of the derived key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the per-ciphertext salt in bytes
pub const SALT_SIZE: usize = 16;

/// Domain separation strings for HKDF
pub mod domain {
    /// Settings, approvals and the password verifier
    pub const SETTINGS: &[u8] = b"keeper-settings-encryption-v1";

    /// Identity-bearing data (connections, identities)
    pub const IDENTITY: &[u8] = b"keeper-identity-encryption-v1";
}

/// An AES-256-GCM encryption key
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derive an encryption key from a secret, a salt and a domain string
pub fn derive_key(secret: &[u8], salt: &[u8], info: &[u8]) -> Result<EncryptionKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), secret);

    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut key)
        .map_err(|_| Error::KeyDerivationFailed("HKDF expansion failed".into()))?;

    Ok(EncryptionKey(key))
}

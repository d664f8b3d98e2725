//! # Cryptography Module
//!
//! Symmetric primitives used by the session lock, the registries and the
//! backup codec.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Session secret (user password, held only in memory)                   │
//! │        │                                                                │
//! │        ├──► HKDF-SHA256(salt, info = mode domain) → AES-256-GCM key    │
//! │        │         │                                                      │
//! │        │         └──► base64(salt || nonce || ciphertext || tag)       │
//! │        │                                                                │
//! │        └──► SHA-256(secret) → HMAC-SHA256 key                          │
//! │                  │                                                      │
//! │                  └──► hex(hmac) || ciphertext   (authenticated backup) │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | AES-256-GCM | At-rest encryption of settings and identity data |
//! | HKDF-SHA256 | Per-ciphertext key from secret + random salt |
//! | HMAC-SHA256 | Backup authentication keyed by SHA-256(secret) |

mod backup;
mod encryption;
mod kdf;

pub use backup::{generate_authenticated_backup, verify_and_strip, BACKUP_MAC_HEX_LEN};
pub use encryption::{decrypt, encrypt, EncryptionMode, NONCE_SIZE};
pub use kdf::{derive_key, EncryptionKey, KEY_SIZE, SALT_SIZE};

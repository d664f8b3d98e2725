//! # Storage Module
//!
//! Persisted key-value slots owned by individual components.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE OWNERSHIP                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  StorageProvider::open(key) ──► Arc<dyn KeyValueStore>                 │
//! │                                                                         │
//! │   keeper.password     → SessionLock        (verifier ciphertext)       │
//! │   keeper.approvals    → ApprovalRegistry   (Settings mode)             │
//! │   keeper.connections  → ConnectionRegistry (Identity mode)             │
//! │                                                                         │
//! │  A slot holds one serialized string. No component touches another     │
//! │  component's slot.                                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod memory;
mod origin_map;

pub use memory::{MemoryStorage, MemoryStore};
pub use origin_map::EncryptedOriginMap;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single persisted slot
///
/// The value is opaque to the store; components serialize and encrypt
/// before calling [`KeyValueStore::set`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the slot
    async fn get(&self) -> Result<Option<String>>;

    /// Overwrite the slot
    async fn set(&self, value: String) -> Result<()>;

    /// Remove the slot
    async fn clear(&self) -> Result<()>;
}

/// Hands out slots by key name
pub trait StorageProvider: Send + Sync {
    /// Open (or create) the slot named `key`
    fn open(&self, key: &str) -> Arc<dyn KeyValueStore>;
}

/// Slot names owned by each component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageKeys {
    /// Password verifier
    pub password: String,
    /// Approved hosts
    pub approvals: String,
    /// Origin → identity connections
    pub connections: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            password: keys::PASSWORD.to_string(),
            approvals: keys::APPROVALS.to_string(),
            connections: keys::CONNECTIONS.to_string(),
        }
    }
}

/// Default slot names
pub mod keys {
    /// The password verifier ciphertext
    pub const PASSWORD: &str = "keeper.password";

    /// Encrypted approved-hosts map
    pub const APPROVALS: &str = "keeper.approvals";

    /// Encrypted connections map
    pub const CONNECTIONS: &str = "keeper.connections";
}

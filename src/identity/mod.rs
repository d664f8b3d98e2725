//! # Identity Module
//!
//! Zero-knowledge identities as seen by the trust core. Identity creation
//! and storage live outside this crate; the core only looks identities up
//! by commitment through [`IdentityStore`].
//!
//! | Field | Shown to pages | Shown in confirmation UI |
//! |-------|----------------|--------------------------|
//! | `commitment` | only after `REVEAL_COMMITMENT` | yes |
//! | `name` | on `CONNECT` | yes |
//! | `serialized` | never | never |

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::Result;

/// A zero-knowledge identity
#[derive(Clone)]
pub struct ZkIdentity {
    commitment: String,
    name: String,
    serialized: Zeroizing<String>,
}

impl ZkIdentity {
    /// Build an identity from its public commitment, display name and
    /// secret serialized form
    pub fn new(commitment: impl Into<String>, name: impl Into<String>, serialized: impl Into<String>) -> Self {
        Self {
            commitment: commitment.into(),
            name: name.into(),
            serialized: Zeroizing::new(serialized.into()),
        }
    }

    /// Public commitment
    pub fn commitment(&self) -> &str {
        &self.commitment
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Secret serialized form handed to the prover
    pub fn serialized(&self) -> &str {
        &self.serialized
    }

    /// Public part, safe to show in the confirmation UI
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity {
            commitment: self.commitment.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Debug for ZkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZkIdentity")
            .field("commitment", &self.commitment)
            .field("name", &self.name)
            .field("serialized", &"<redacted>")
            .finish()
    }
}

/// Public portion of an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    /// Identity commitment
    pub commitment: String,
    /// Display name
    pub name: String,
}

/// Lookup of identities held by the wallet
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Identity with the given commitment
    async fn get_identity(&self, commitment: &str) -> Result<Option<ZkIdentity>>;

    /// Identity currently selected in the wallet
    async fn get_connected_identity(&self) -> Result<Option<ZkIdentity>>;
}

/// In-memory identity store
#[derive(Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<String, ZkIdentity>>,
    selected: RwLock<Option<String>>,
}

impl MemoryIdentityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an identity
    pub fn insert(&self, identity: ZkIdentity) {
        self.identities
            .write()
            .insert(identity.commitment().to_string(), identity);
    }

    /// Select the wallet's current identity
    pub fn select(&self, commitment: Option<&str>) {
        *self.selected.write() = commitment.map(str::to_string);
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get_identity(&self, commitment: &str) -> Result<Option<ZkIdentity>> {
        Ok(self.identities.read().get(commitment).cloned())
    }

    async fn get_connected_identity(&self) -> Result<Option<ZkIdentity>> {
        let selected = self.selected.read().clone();
        Ok(selected.and_then(|c| self.identities.read().get(&c).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let identity = ZkIdentity::new("123", "Account #1", "{\"trapdoor\":\"1\"}");
        let debug = format!("{:?}", identity);

        assert!(debug.contains("123"));
        assert!(!debug.contains("trapdoor"));
    }

    #[tokio::test]
    async fn test_memory_identity_store() {
        let store = MemoryIdentityStore::new();
        store.insert(ZkIdentity::new("123", "Account #1", "secret"));

        assert!(store.get_identity("123").await.unwrap().is_some());
        assert!(store.get_identity("456").await.unwrap().is_none());
        assert!(store.get_connected_identity().await.unwrap().is_none());

        store.select(Some("123"));
        let selected = store.get_connected_identity().await.unwrap().unwrap();
        assert_eq!(selected.public().name, "Account #1");
    }
}

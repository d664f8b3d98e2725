//! # Connections Module
//!
//! Binding of approved origins to a single identity each.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CONNECTION REGISTRY                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  origin ──► { commitment, name }      at most one identity per origin  │
//! │                                                                         │
//! │  connect(commitment, origin)  ──► page receives CONNECT { name }       │
//! │  disconnect(origin|commitment) ─► page receives DISCONNECT             │
//! │  clear()                       ──► every page receives DISCONNECT      │
//! │                                                                         │
//! │  Persisted encrypted (Identity mode). Dropped from memory on logout.   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The commitment is never pushed to a page here; pages learn it only
//! through an explicit reveal.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backup::Backupable;
use crate::crypto::EncryptionMode;
use crate::error::{Error, Result};
use crate::identity::{IdentityStore, ZkIdentity};
use crate::session::{SessionLock, SessionObserver};
use crate::storage::{EncryptedOriginMap, KeyValueStore};
use crate::surface::{PageEvent, SurfaceController};

/// Backup component key
pub const COMPONENT: &str = "connections";

/// Identity stored for a connected origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedIdentity {
    /// Identity commitment
    pub commitment: String,
    /// Display name at connection time
    pub name: String,
}

/// An origin connected to an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Connected origin
    pub origin: String,
    /// Identity commitment
    pub commitment: String,
    /// Display name
    pub name: String,
}

impl Connection {
    fn new(origin: String, identity: ConnectedIdentity) -> Self {
        Self {
            origin,
            commitment: identity.commitment,
            name: identity.name,
        }
    }
}

/// Resolves the identity an origin is connected to
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Full identity connected to `origin`, if any
    async fn connected_identity(&self, origin: &str) -> Result<Option<ZkIdentity>>;
}

/// Registry of origin → identity connections
pub struct ConnectionRegistry {
    connections: EncryptedOriginMap<ConnectedIdentity>,
    identities: Arc<dyn IdentityStore>,
    surfaces: Arc<dyn SurfaceController>,
}

impl ConnectionRegistry {
    /// Create a registry backed by its own storage slot
    pub fn new(
        session: Arc<SessionLock>,
        store: Arc<dyn KeyValueStore>,
        identities: Arc<dyn IdentityStore>,
        surfaces: Arc<dyn SurfaceController>,
    ) -> Self {
        Self {
            connections: EncryptedOriginMap::new(COMPONENT, EncryptionMode::Identity, session, store),
            identities,
            surfaces,
        }
    }

    /// Decrypt the persisted connections; no-op if already loaded
    pub async fn unlock(&self) -> Result<bool> {
        self.connections.load().await?;
        Ok(true)
    }

    /// Whether the connections are decrypted in memory
    pub fn is_loaded(&self) -> bool {
        self.connections.is_loaded()
    }

    /// All connections, ordered by origin
    pub fn get_connections(&self) -> Vec<Connection> {
        self.connections
            .entries()
            .into_iter()
            .map(|(origin, identity)| Connection::new(origin, identity))
            .collect()
    }

    /// Connection of `origin`
    pub fn get_connection(&self, origin: &str) -> Option<Connection> {
        self.connections
            .get(origin)
            .map(|identity| Connection::new(origin.to_string(), identity))
    }

    /// Whether `origin` is connected to an identity
    pub fn is_connected(&self, origin: &str) -> bool {
        self.connections.get(origin).is_some()
    }

    /// Connect `origin` to the identity with `commitment`
    ///
    /// Any previous connection of the origin is replaced.
    pub async fn connect(&self, commitment: &str, origin: &str) -> Result<Connection> {
        if origin.is_empty() {
            return Err(Error::OriginMissing);
        }

        let identity = self
            .identities
            .get_identity(commitment)
            .await?
            .ok_or(Error::IdentityMissing)?;

        let connected = ConnectedIdentity {
            commitment: identity.commitment().to_string(),
            name: identity.name().to_string(),
        };
        self.connections.upsert(origin, connected.clone()).await?;
        tracing::info!("Connected {} to identity {}", origin, connected.name);

        self.notify(
            origin,
            PageEvent::Connect {
                name: connected.name.clone(),
            },
        )
        .await;

        Ok(Connection::new(origin.to_string(), connected))
    }

    /// Remove the connection matching an origin, or else an identity
    /// commitment
    pub async fn disconnect(&self, origin_or_commitment: &str) -> Result<Connection> {
        if origin_or_commitment.is_empty() {
            return Err(Error::OriginMissing);
        }

        self.connections.load().await?;
        let origin = if self.connections.get(origin_or_commitment).is_some() {
            origin_or_commitment.to_string()
        } else {
            self.connections
                .find(|c| c.commitment == origin_or_commitment)
                .map(|(origin, _)| origin)
                .ok_or(Error::NotConnected)?
        };

        let removed = self
            .connections
            .remove(&origin)
            .await?
            .ok_or(Error::NotConnected)?;
        tracing::info!("Disconnected {}", origin);

        self.notify(&origin, PageEvent::Disconnect).await;
        Ok(Connection::new(origin, removed))
    }

    /// Disconnect every origin
    pub async fn clear(&self) -> Result<()> {
        self.connections.load().await?;

        for (origin, _) in self.connections.entries() {
            self.notify(&origin, PageEvent::Disconnect).await;
        }

        self.connections.clear().await?;
        tracing::info!("Cleared all connections");
        Ok(())
    }

    async fn notify(&self, origin: &str, event: PageEvent) {
        if let Err(e) = self.surfaces.push_event(origin, event).await {
            tracing::debug!("Event for {} not delivered: {}", origin, e);
        }
    }
}

#[async_trait]
impl IdentityResolver for ConnectionRegistry {
    async fn connected_identity(&self, origin: &str) -> Result<Option<ZkIdentity>> {
        let Some(connection) = self.connections.get(origin) else {
            return Ok(None);
        };
        self.identities.get_identity(&connection.commitment).await
    }
}

impl SessionObserver for ConnectionRegistry {
    fn on_lock(&self) {
        self.connections.unload();
    }
}

#[async_trait]
impl Backupable for ConnectionRegistry {
    fn component_key(&self) -> &str {
        COMPONENT
    }

    async fn download_encrypted_storage(&self, backup_password: &str) -> Result<Option<String>> {
        self.connections.download_backup(backup_password).await
    }

    async fn upload_encrypted_storage(&self, backup: &str, backup_password: &str) -> Result<()> {
        self.connections.upload_backup(backup, backup_password).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

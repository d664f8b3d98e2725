//! # Trust Gate
//!
//! Drives an origin from unknown to connected.
//!
//! ## Connect Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           CONNECT FLOW                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  connect(origin, is_change_identity)                                   │
//! │     │                                                                   │
//! │     ├─ locked? ──► open popup, await unlock, load registries,          │
//! │     │              close popup                                         │
//! │     │                                                                   │
//! │     ├─ approved? ──yes──► refresh entry with the known flag            │
//! │     │            ──no───► APPROVE {origin} ──► add {origin, flag}      │
//! │     │                                                                   │
//! │     └─ not connected, or changing identity?                            │
//! │                  ──► IdentityConnector::connect_identity(origin)       │
//! │                                                                         │
//! │  Any failure: "error in the connect request, <message>"                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-origin state is never stored here; it is read from the registries
//! each time:
//!
//! | State | Approval entry | Connection |
//! |-------|----------------|------------|
//! | unknown | no | no |
//! | approved | yes | no |
//! | connected | yes | yes |

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::approvals::{ApprovalEntry, ApprovalRegistry, Approver, HostPermission};
use crate::broker::{RequestBroker, RequestKind};
use crate::connections::{Connection, ConnectionRegistry};
use crate::error::{Error, Result};
use crate::identity::IdentityStore;
use crate::session::SessionLock;
use crate::surface::{PageEvent, SurfaceController};

/// Picks the identity to connect an origin to
#[async_trait]
pub trait IdentityConnector: Send + Sync {
    /// Connect `origin` to an identity chosen by the user
    async fn connect_identity(&self, origin: &str) -> Result<Connection>;
}

/// Identity choice returned by the confirmation surface
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdentityChoice {
    commitment: Option<String>,
}

/// Asks the user through a `CONNECT_IDENTITY` request
///
/// If the surface accepts without naming a commitment, the identity
/// currently selected in the wallet is used.
pub struct BrokerIdentityConnector {
    broker: Arc<RequestBroker>,
    connections: Arc<ConnectionRegistry>,
    identities: Arc<dyn IdentityStore>,
}

impl BrokerIdentityConnector {
    /// Create a connector
    pub fn new(
        broker: Arc<RequestBroker>,
        connections: Arc<ConnectionRegistry>,
        identities: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            broker,
            connections,
            identities,
        }
    }
}

#[async_trait]
impl IdentityConnector for BrokerIdentityConnector {
    async fn connect_identity(&self, origin: &str) -> Result<Connection> {
        let data = self
            .broker
            .new_request(RequestKind::ConnectIdentity, json!({ "origin": origin }))
            .await?;

        let choice: IdentityChoice = if data.is_null() {
            IdentityChoice::default()
        } else {
            serde_json::from_value(data)?
        };

        let commitment = match choice.commitment {
            Some(commitment) => commitment,
            None => self
                .identities
                .get_connected_identity()
                .await?
                .map(|identity| identity.commitment().to_string())
                .ok_or(Error::IdentityMissing)?,
        };

        self.connections.connect(&commitment, origin).await
    }
}

/// Composes the session and registries into the page-facing trust flows
pub struct TrustGate {
    session: Arc<SessionLock>,
    approvals: Arc<ApprovalRegistry>,
    connections: Arc<ConnectionRegistry>,
    broker: Arc<RequestBroker>,
    surfaces: Arc<dyn SurfaceController>,
    connector: Arc<dyn IdentityConnector>,
}

impl TrustGate {
    /// Create a gate
    pub fn new(
        session: Arc<SessionLock>,
        approvals: Arc<ApprovalRegistry>,
        connections: Arc<ConnectionRegistry>,
        broker: Arc<RequestBroker>,
        surfaces: Arc<dyn SurfaceController>,
        connector: Arc<dyn IdentityConnector>,
    ) -> Self {
        Self {
            session,
            approvals,
            connections,
            broker,
            surfaces,
            connector,
        }
    }

    /// Unlock, approve and connect `origin` as needed
    pub async fn connect(&self, origin: &str, is_change_identity: bool) -> Result<Connection> {
        self.run_connect(origin, is_change_identity)
            .await
            .map_err(|e| {
                tracing::warn!("Connect request from {} failed: {}", origin, e);
                Error::ConnectRequestFailed(e.to_string())
            })
    }

    async fn run_connect(&self, origin: &str, is_change_identity: bool) -> Result<Connection> {
        if origin.is_empty() {
            return Err(Error::OriginMissing);
        }

        self.ensure_unlocked().await?;

        if self.approvals.is_approved(origin) {
            let can_skip_approve = self.approvals.can_skip_approve(origin);
            self.approvals
                .add(ApprovalEntry {
                    origin: origin.to_string(),
                    can_skip_approve,
                })
                .await?;
        } else {
            let data = self
                .broker
                .new_request(RequestKind::Approve, json!({ "origin": origin }))
                .await?;
            let permission: HostPermission = if data.is_null() {
                HostPermission::default()
            } else {
                serde_json::from_value(data)?
            };
            self.approvals
                .add(ApprovalEntry {
                    origin: origin.to_string(),
                    can_skip_approve: permission.can_skip_approve,
                })
                .await?;
        }

        match self.connections.get_connection(origin) {
            Some(connection) if !is_change_identity => Ok(connection),
            _ => self.connector.connect_identity(origin).await,
        }
    }

    /// `payload` if `origin` is connected, otherwise `None`
    pub fn is_connected(&self, origin: &str, payload: Value) -> Option<Value> {
        self.connections.is_connected(origin).then_some(payload)
    }

    /// Ask the user to reveal the connected identity's commitment to
    /// `origin`, and push it to the page on acceptance
    pub async fn reveal_commitment(&self, origin: &str) -> Result<()> {
        let connection = self
            .connections
            .get_connection(origin)
            .ok_or(Error::NotConnected)?;

        self.broker
            .new_request(
                RequestKind::RevealCommitment,
                json!({ "origin": origin, "name": connection.name }),
            )
            .await?;

        tracing::info!("Revealing commitment of {} to {}", connection.name, origin);
        self.surfaces
            .push_event(
                origin,
                PageEvent::RevealCommitment {
                    commitment: connection.commitment,
                },
            )
            .await
    }

    /// Remove the approval of `origin` and disconnect it
    pub async fn revoke(&self, origin: &str) -> Result<()> {
        if origin.is_empty() {
            return Err(Error::OriginMissing);
        }

        self.approvals.remove(origin).await?;
        if self.connections.is_connected(origin) {
            self.connections.disconnect(origin).await?;
        }
        Ok(())
    }

    async fn ensure_unlocked(&self) -> Result<()> {
        if !self.session.is_unlocked() {
            tracing::debug!("Session locked, asking the user to unlock");
            let popup = self.surfaces.open_popup().await?;
            self.session.await_unlock().await?;
            self.approvals.unlock().await?;
            self.connections.unlock().await?;

            if let Err(e) = self.surfaces.close_popup(Some(popup.id)).await {
                tracing::debug!("Could not close unlock popup: {}", e);
            }
        }

        self.approvals.unlock().await?;
        self.connections.unlock().await?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

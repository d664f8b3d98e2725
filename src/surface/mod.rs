//! # Surface Module
//!
//! Interface to the host runtime's user-facing surfaces: the confirmation
//! popup, the other extension pages, and the page contexts of requesting
//! origins.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CONTEXT MESSAGING                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Background core ──open/close──► Confirmation popup                   │
//! │         │        ◄──close event──                                       │
//! │         │                                                               │
//! │         ├──broadcast(ExtensionMessage)──► every open extension surface │
//! │         │                                                               │
//! │         └──push_event(origin, PageEvent)──► injected provider of origin│
//! │                                                                         │
//! │   All calls are asynchronous. Delivery is FIFO per channel with no     │
//! │   ordering across channels.                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::broker::PendingRequest;
use crate::error::Result;
use crate::session::SessionStatus;

/// Identifier of a host window
pub type WindowId = u64;

/// Handle to an opened confirmation popup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupHandle {
    /// Window id assigned by the host
    pub id: WindowId,
}

/// Callback invoked with the id of a window that was closed
pub type CloseListener = Arc<dyn Fn(WindowId) + Send + Sync>;

/// Registration handle for a [`CloseListener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Events delivered to a page context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageEvent {
    /// The origin is now connected to an identity (commitment withheld)
    Connect {
        /// Display name of the connected identity
        name: String,
    },
    /// The origin's connection was removed
    Disconnect,
    /// The user agreed to reveal the connected identity's commitment
    RevealCommitment {
        /// Identity commitment
        commitment: String,
    },
}

/// Messages broadcast to every open extension surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionMessage {
    /// Lock state after a transition
    SessionStatus(SessionStatus),
    /// The current pending-request queue, in display order
    PendingRequests(Vec<PendingRequest>),
}

/// Host runtime surface primitives
#[async_trait]
pub trait SurfaceController: Send + Sync {
    /// Open the confirmation popup
    async fn open_popup(&self) -> Result<PopupHandle>;

    /// Close the confirmation popup (`None` closes whichever is open)
    async fn close_popup(&self, id: Option<WindowId>) -> Result<()>;

    /// Register a window-close listener
    fn add_close_listener(&self, listener: CloseListener) -> ListenerId;

    /// Unregister a window-close listener
    fn remove_close_listener(&self, id: ListenerId);

    /// Deliver an event to the page context of `origin`
    async fn push_event(&self, origin: &str, event: PageEvent) -> Result<()>;

    /// Deliver a message to every open extension surface
    async fn broadcast(&self, message: ExtensionMessage) -> Result<()>;
}

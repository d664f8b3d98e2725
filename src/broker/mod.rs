//! # Request Broker
//!
//! Bridges requests raised on behalf of untrusted pages to the user-facing
//! confirmation popup.
//!
//! ## Request Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          REQUEST HANDSHAKE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  submit(kind, payload)                                                 │
//! │     │                                                                   │
//! │     ├──► queue.push({id: nonce++, kind, payload})                      │
//! │     ├──► first entry? open popup + register close listener             │
//! │     ├──► broadcast(PENDING_REQUESTS)                                   │
//! │     └──► PendingReply { id, oneshot::Receiver }                        │
//! │                                                                         │
//! │  finalize({id, status, data})            popup closed                  │
//! │     │                                       │                           │
//! │     ├──► ACCEPT  → Ok(data)                 └──► every queued request  │
//! │     ├──► REJECT  → "user rejected."              → "user rejected."    │
//! │     ├──► other   → "action: X not supported"                           │
//! │     ├──► broadcast(PENDING_REQUESTS)                                   │
//! │     └──► queue empty? remove listener, then close popup                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The queue order is display order only. Requests may be finalized in any
//! order. A reply is delivered at most once: finalizing removes the entry,
//! and the close listener is unregistered before the broker closes the
//! popup itself.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::surface::{ExtensionMessage, ListenerId, PopupHandle, SurfaceController, WindowId};

/// Kind of a pending request, which selects the confirmation screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    /// Approve an origin
    Approve,
    /// Pick the identity to connect to an origin
    ConnectIdentity,
    /// Confirm a Semaphore proof
    SemaphoreProof,
    /// Confirm an RLN proof
    RlnProof,
    /// Reveal the connected identity's commitment to an origin
    RevealCommitment,
}

/// A request waiting for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Correlation id
    pub id: u64,
    /// Request kind
    #[serde(rename = "type")]
    pub kind: RequestKind,
    /// Data shown on the confirmation screen
    pub payload: Value,
}

/// User decision on a pending request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestStatus {
    /// `ACCEPT`
    Accept,
    /// `REJECT`
    Reject,
    /// Anything else the surface sent
    Other(String),
}

impl From<String> for RequestStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "ACCEPT" => Self::Accept,
            "REJECT" => Self::Reject,
            _ => Self::Other(status),
        }
    }
}

impl From<RequestStatus> for String {
    fn from(status: RequestStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => f.write_str("ACCEPT"),
            Self::Reject => f.write_str("REJECT"),
            Self::Other(status) => f.write_str(status),
        }
    }
}

/// Resolution sent back by the confirmation surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    /// Id of the request being resolved
    pub id: u64,
    /// User decision
    pub status: RequestStatus,
    /// Result data for an accepted request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Handle to the eventual reply of a submitted request
#[derive(Debug)]
pub struct PendingReply {
    id: u64,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingReply {
    /// Correlation id of the request
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the user's decision
    ///
    /// There is no timeout; the future stays pending until the request is
    /// finalized or the popup is closed.
    pub async fn wait(self) -> Result<Value> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Internal("request broker dropped".into())),
        }
    }
}

struct QueuedRequest {
    request: PendingRequest,
    reply: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct BrokerState {
    nonce: u64,
    queue: Vec<QueuedRequest>,
    popup: Option<PopupHandle>,
    listener: Option<ListenerId>,
}

/// Ordered queue of requests awaiting user confirmation
pub struct RequestBroker {
    surfaces: Arc<dyn SurfaceController>,
    state: Mutex<BrokerState>,
    this: Weak<RequestBroker>,
}

impl RequestBroker {
    /// Create an empty broker
    pub fn new(surfaces: Arc<dyn SurfaceController>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            surfaces,
            state: Mutex::new(BrokerState::default()),
            this: this.clone(),
        })
    }

    /// Snapshot of the queue in display order
    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        self.state
            .lock()
            .queue
            .iter()
            .map(|q| q.request.clone())
            .collect()
    }

    /// Queue a request and return a handle to its reply
    pub async fn submit(&self, kind: RequestKind, payload: Value) -> Result<PendingReply> {
        let (tx, rx) = oneshot::channel();

        let (id, first) = {
            let mut state = self.state.lock();
            let id = state.nonce;
            state.nonce += 1;
            state.queue.push(QueuedRequest {
                request: PendingRequest { id, kind, payload },
                reply: tx,
            });
            (id, state.queue.len() == 1)
        };
        tracing::debug!("Queued {:?} request {}", kind, id);

        if first {
            if let Err(e) = self.open_surface().await {
                return Err(self.abandon_queue(id, e).await);
            }
        }

        self.broadcast_queue().await;
        Ok(PendingReply { id, rx })
    }

    /// Queue a request and wait for the user's decision
    pub async fn new_request(&self, kind: RequestKind, payload: Value) -> Result<Value> {
        self.submit(kind, payload).await?.wait().await
    }

    /// Resolve a pending request
    ///
    /// Returns `false` (and changes nothing) if no request has that id.
    pub async fn finalize(&self, request: FinalizeRequest) -> Result<bool> {
        let (entry, surface) = {
            let mut state = self.state.lock();
            let Some(index) = state.queue.iter().position(|q| q.request.id == request.id) else {
                tracing::debug!("Ignoring finalize of unknown request {}", request.id);
                return Ok(false);
            };
            let entry = state.queue.remove(index);
            let surface = if state.queue.is_empty() {
                Some((state.popup.take(), state.listener.take()))
            } else {
                None
            };
            (entry, surface)
        };

        let outcome = match request.status {
            RequestStatus::Accept => Ok(request.data.unwrap_or(Value::Null)),
            RequestStatus::Reject => Err(Error::UserRejected),
            RequestStatus::Other(status) => Err(Error::UnsupportedAction(status)),
        };
        tracing::info!(
            "Finalized {:?} request {} ({})",
            entry.request.kind,
            entry.request.id,
            if outcome.is_ok() { "accepted" } else { "rejected" }
        );
        // The requester may have stopped waiting
        let _ = entry.reply.send(outcome);

        self.broadcast_queue().await;

        if let Some((popup, listener)) = surface {
            if let Some(listener) = listener {
                self.surfaces.remove_close_listener(listener);
            }
            if let Err(e) = self.surfaces.close_popup(popup.map(|p| p.id)).await {
                tracing::debug!("Could not close confirmation popup: {}", e);
            }
        }

        Ok(true)
    }

    /// Reject every queued request because `window` was closed
    ///
    /// Only reacts to the popup this broker opened.
    pub fn handle_surface_closed(&self, window: WindowId) {
        let (rejected, listener) = {
            let mut state = self.state.lock();
            if state.popup.map(|p| p.id) != Some(window) {
                return;
            }
            state.popup = None;
            (std::mem::take(&mut state.queue), state.listener.take())
        };

        if let Some(listener) = listener {
            self.surfaces.remove_close_listener(listener);
        }

        tracing::info!("Confirmation popup closed, rejecting {} requests", rejected.len());
        for entry in rejected {
            let _ = entry.reply.send(Err(Error::UserRejected));
        }
    }

    /// Reject every request queued behind a popup that failed to open
    ///
    /// Returns the error for request `id`, the one that attempted the open.
    async fn abandon_queue(&self, id: u64, cause: Error) -> Error {
        let error = match cause {
            Error::SurfaceUnavailable(_) => cause,
            other => Error::SurfaceUnavailable(other.to_string()),
        };

        let abandoned = std::mem::take(&mut self.state.lock().queue);
        tracing::warn!(
            "Could not open confirmation popup, rejecting {} requests: {}",
            abandoned.len(),
            error
        );
        for entry in abandoned.into_iter().filter(|q| q.request.id != id) {
            let _ = entry.reply.send(Err(error.clone()));
        }

        self.broadcast_queue().await;
        error
    }

    async fn open_surface(&self) -> Result<()> {
        let popup = self.surfaces.open_popup().await?;

        let broker = self.this.clone();
        let listener = self.surfaces.add_close_listener(Arc::new(move |window| {
            if let Some(broker) = broker.upgrade() {
                broker.handle_surface_closed(window);
            }
        }));

        let mut state = self.state.lock();
        state.popup = Some(popup);
        state.listener = Some(listener);
        Ok(())
    }

    async fn broadcast_queue(&self) {
        let queue = self.pending_requests();
        if let Err(e) = self
            .surfaces
            .broadcast(ExtensionMessage::PendingRequests(queue))
            .await
        {
            tracing::debug!("Queue broadcast not delivered: {}", e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSurface;
    use serde_json::json;

    fn broker() -> (Arc<RequestBroker>, Arc<RecordingSurface>) {
        let surfaces = Arc::new(RecordingSurface::new());
        (RequestBroker::new(surfaces.clone()), surfaces)
    }

    fn origin() -> Value {
        json!({ "origin": "http://localhost:3000" })
    }

    fn finalize(id: u64, status: &str, data: Option<Value>) -> FinalizeRequest {
        FinalizeRequest {
            id,
            status: RequestStatus::from(status.to_string()),
            data,
        }
    }

    #[tokio::test]
    async fn test_accept_resolves_with_data() {
        let (broker, _) = broker();

        let reply = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        let id = reply.id();
        assert!(broker
            .finalize(finalize(id, "ACCEPT", Some(json!({ "done": true }))))
            .await
            .unwrap());

        assert_eq!(reply.wait().await.unwrap(), json!({ "done": true }));
    }

    #[tokio::test]
    async fn test_reject() {
        let (broker, _) = broker();

        let reply = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        broker.finalize(finalize(reply.id(), "REJECT", None)).await.unwrap();

        let err = reply.wait().await.unwrap_err();
        assert_eq!(err, Error::UserRejected);
        assert_eq!(err.to_string(), "user rejected.");
    }

    #[tokio::test]
    async fn test_unknown_status() {
        let (broker, _) = broker();

        let reply = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        broker.finalize(finalize(reply.id(), "unknown", None)).await.unwrap();

        let err = reply.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "action: unknown not supported");
    }

    #[tokio::test]
    async fn test_new_request_waits_for_finalize() {
        let (broker, _) = broker();

        let mut request = tokio_test::task::spawn({
            let broker = broker.clone();
            async move { broker.new_request(RequestKind::Approve, origin()).await }
        });
        tokio_test::assert_pending!(request.poll());

        let pending = broker.pending_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, RequestKind::Approve);
        assert_eq!(pending[0].payload, origin());

        broker
            .finalize(finalize(pending[0].id, "ACCEPT", Some(json!({ "done": true }))))
            .await
            .unwrap();

        assert!(request.is_woken());
        assert_eq!(
            tokio_test::assert_ready_ok!(request.poll()),
            json!({ "done": true })
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_noop() {
        let (broker, surfaces) = broker();
        let _reply = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        let broadcasts = surfaces.broadcasts().len();

        assert!(!broker.finalize(finalize(42, "ACCEPT", None)).await.unwrap());

        assert_eq!(broker.pending_requests().len(), 1);
        assert_eq!(surfaces.broadcasts().len(), broadcasts);
        assert!(surfaces.closed_popups().is_empty());
    }

    #[tokio::test]
    async fn test_popup_lifecycle() {
        let (broker, surfaces) = broker();

        let first = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        let second = broker.submit(RequestKind::RevealCommitment, origin()).await.unwrap();
        assert_eq!(surfaces.opened_popups(), 1);
        assert_eq!(surfaces.listener_count(), 1);
        assert_ne!(first.id(), second.id());

        // Out of insertion order
        broker.finalize(finalize(second.id(), "ACCEPT", None)).await.unwrap();
        assert!(surfaces.closed_popups().is_empty());

        broker.finalize(finalize(first.id(), "ACCEPT", None)).await.unwrap();
        assert_eq!(surfaces.closed_popups().len(), 1);
        assert_eq!(surfaces.listener_count(), 0);

        // The broker's own close does not reject anything twice
        assert_eq!(first.wait().await.unwrap(), Value::Null);
        assert_eq!(second.wait().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_close_rejects_every_queued_request() {
        let (broker, surfaces) = broker();

        let first = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        let second = broker.submit(RequestKind::SemaphoreProof, json!({})).await.unwrap();
        let window = surfaces.last_popup().unwrap();

        surfaces.close_window(window);
        assert!(broker.pending_requests().is_empty());
        assert_eq!(surfaces.listener_count(), 0);

        // A second close event has nothing left to reject
        surfaces.close_window(window);

        assert_eq!(first.wait().await, Err(Error::UserRejected));
        assert_eq!(second.wait().await, Err(Error::UserRejected));
    }

    #[tokio::test]
    async fn test_close_of_other_window_is_ignored() {
        let (broker, surfaces) = broker();
        let _reply = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        let window = surfaces.last_popup().unwrap();

        surfaces.close_window(window + 100);

        assert_eq!(broker.pending_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_next_request_reopens_popup() {
        let (broker, surfaces) = broker();

        let reply = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        broker.finalize(finalize(reply.id(), "REJECT", None)).await.unwrap();
        let _reply = broker.submit(RequestKind::Approve, origin()).await.unwrap();

        assert_eq!(surfaces.opened_popups(), 2);
    }

    #[tokio::test]
    async fn test_failed_popup_rejects_requests_queued_behind_it() {
        let (broker, surfaces) = broker();
        let gate = surfaces.hold_popups();
        surfaces.fail_popups(true);

        let mut first = tokio_test::task::spawn({
            let broker = broker.clone();
            async move { broker.submit(RequestKind::Approve, origin()).await }
        });
        tokio_test::assert_pending!(first.poll());

        // Queued while the popup is still opening
        let second = broker.submit(RequestKind::RevealCommitment, origin()).await.unwrap();
        assert_eq!(surfaces.popup_attempts(), 1);

        gate.notify_one();
        let err = tokio_test::assert_ready_err!(first.poll());
        assert!(matches!(err, Error::SurfaceUnavailable(_)));
        assert!(matches!(second.wait().await, Err(Error::SurfaceUnavailable(_))));
        assert!(broker.pending_requests().is_empty());

        // The next request starts over with a popup of its own
        surfaces.fail_popups(false);
        let _third = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        assert_eq!(surfaces.popup_attempts(), 2);
        assert_eq!(surfaces.opened_popups(), 1);
        assert_eq!(surfaces.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_popup_error_is_surface_unavailable() {
        let (broker, surfaces) = broker();
        surfaces.fail_popups(true);

        let err = broker.submit(RequestKind::Approve, origin()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Failed to open confirmation surface: window creation refused"
        );
        assert!(broker.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn test_queue_is_broadcast() {
        let (broker, surfaces) = broker();

        let reply = broker.submit(RequestKind::Approve, origin()).await.unwrap();
        broker.finalize(finalize(reply.id(), "ACCEPT", None)).await.unwrap();

        let queues: Vec<usize> = surfaces
            .broadcasts()
            .into_iter()
            .filter_map(|m| match m {
                ExtensionMessage::PendingRequests(q) => Some(q.len()),
                _ => None,
            })
            .collect();
        assert_eq!(queues, vec![1, 0]);
    }

    #[test]
    fn test_wire_format() {
        let request: FinalizeRequest =
            serde_json::from_str(r#"{"id":3,"status":"ACCEPT","data":{"done":true}}"#).unwrap();
        assert_eq!(request.status, RequestStatus::Accept);

        let pending = PendingRequest {
            id: 0,
            kind: RequestKind::RlnProof,
            payload: Value::Null,
        };
        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json["type"], "RLN_PROOF");
    }
}

//! In-memory doubles for the host collaborators, shared by the test modules.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, Notify};

use crate::approvals::Approver;
use crate::connections::IdentityResolver;
use crate::error::{Error, Result};
use crate::identity::ZkIdentity;
use crate::proof::{
    ArtifactConfig, ArtifactPaths, FullProof, MerkleProofFields, MerkleProofSource, PreparedProof,
    ProofJob, ProofOutput, Prover, RlnFullProof, RlnProofRequest, Sandbox, SandboxFactory,
    SandboxMessage, SemaphoreFullProof, SemaphoreProofRequest,
};
use crate::surface::{
    CloseListener, ExtensionMessage, ListenerId, PageEvent, PopupHandle, SurfaceController, WindowId,
};

// ============================================================================
// SURFACES
// ============================================================================

/// Surface controller that records everything and lets tests close windows
#[derive(Default)]
pub struct RecordingSurface {
    next_window: AtomicU64,
    next_listener: AtomicU64,
    opened: Mutex<Vec<WindowId>>,
    closed: Mutex<Vec<Option<WindowId>>>,
    listeners: Mutex<BTreeMap<u64, CloseListener>>,
    events: Mutex<Vec<(String, PageEvent)>>,
    broadcasts: Mutex<Vec<ExtensionMessage>>,
    fail_broadcasts: AtomicBool,
    fail_events: AtomicBool,
    fail_popups: AtomicBool,
    popup_attempts: AtomicUsize,
    popup_gate: Mutex<Option<Arc<Notify>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            next_window: AtomicU64::new(1),
            ..Default::default()
        }
    }

    pub fn fail_broadcasts(&self, fail: bool) {
        self.fail_broadcasts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    pub fn fail_popups(&self, fail: bool) {
        self.fail_popups.store(fail, Ordering::SeqCst);
    }

    /// Make `open_popup` wait until the returned gate is notified
    pub fn hold_popups(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.popup_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn popup_attempts(&self) -> usize {
        self.popup_attempts.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> Vec<ExtensionMessage> {
        self.broadcasts.lock().clone()
    }

    pub fn pushed_events(&self) -> Vec<(String, PageEvent)> {
        self.events.lock().clone()
    }

    pub fn opened_popups(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn last_popup(&self) -> Option<WindowId> {
        self.opened.lock().last().copied()
    }

    pub fn closed_popups(&self) -> Vec<Option<WindowId>> {
        self.closed.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Simulate the user closing `window`
    pub fn close_window(&self, window: WindowId) {
        let listeners: Vec<CloseListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(window);
        }
    }
}

#[async_trait]
impl SurfaceController for RecordingSurface {
    async fn open_popup(&self) -> Result<PopupHandle> {
        self.popup_attempts.fetch_add(1, Ordering::SeqCst);
        let gate = self.popup_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_popups.load(Ordering::SeqCst) {
            return Err(Error::SurfaceUnavailable("window creation refused".into()));
        }

        let id = self.next_window.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().push(id);
        Ok(PopupHandle { id })
    }

    async fn close_popup(&self, id: Option<WindowId>) -> Result<()> {
        self.closed.lock().push(id);
        if let Some(window) = id.or_else(|| self.last_popup()) {
            self.close_window(window);
        }
        Ok(())
    }

    fn add_close_listener(&self, listener: CloseListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, listener);
        ListenerId(id)
    }

    fn remove_close_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id.0);
    }

    async fn push_event(&self, origin: &str, event: PageEvent) -> Result<()> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(Error::TransportError("page context is gone".into()));
        }
        self.events.lock().push((origin.to_string(), event));
        Ok(())
    }

    async fn broadcast(&self, message: ExtensionMessage) -> Result<()> {
        if self.fail_broadcasts.load(Ordering::SeqCst) {
            return Err(Error::TransportError("no receiving end".into()));
        }
        self.broadcasts.lock().push(message);
        Ok(())
    }
}

// ============================================================================
// TRUST CAPABILITIES
// ============================================================================

/// Approver with a fixed answer for every origin
pub struct FixedApprover {
    pub can_skip_approve: bool,
}

impl Approver for FixedApprover {
    fn is_approved(&self, _origin: &str) -> bool {
        true
    }

    fn can_skip_approve(&self, _origin: &str) -> bool {
        self.can_skip_approve
    }
}

/// Resolver returning the same identity for every origin
pub struct FixedResolver(pub Option<ZkIdentity>);

#[async_trait]
impl IdentityResolver for FixedResolver {
    async fn connected_identity(&self, _origin: &str) -> Result<Option<ZkIdentity>> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// PROVERS
// ============================================================================

/// Prover returning canned proofs
#[derive(Default)]
pub struct StaticProver {
    calls: AtomicUsize,
    last_identity: Mutex<Option<String>>,
}

impl StaticProver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_identity(&self) -> Option<String> {
        self.last_identity.lock().clone()
    }

    fn record<R>(&self, request: &PreparedProof<R>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_identity.lock() = request.identity_serialized.clone();
    }

    fn snark() -> FullProof {
        FullProof {
            proof: json!({ "protocol": "groth16", "curve": "bn128" }),
            public_signals: vec!["1".to_string()],
        }
    }
}

#[async_trait]
impl Prover for StaticProver {
    async fn semaphore_proof(
        &self,
        request: &PreparedProof<SemaphoreProofRequest>,
    ) -> Result<SemaphoreFullProof> {
        self.record(request);
        Ok(Self::snark())
    }

    async fn rln_proof(&self, request: &PreparedProof<RlnProofRequest>) -> Result<RlnFullProof> {
        self.record(request);
        Ok(RlnFullProof {
            snark_proof: Self::snark(),
            epoch: request.request.epoch.clone(),
            rln_identifier: request.request.rln_identifier.clone(),
        })
    }
}

/// Factory for channel-backed isolated contexts
#[derive(Default)]
pub struct FakeSandboxFactory {
    created: AtomicUsize,
    torn_down: Arc<AtomicUsize>,
    lose_messages: AtomicBool,
    fail_proofs: AtomicBool,
    jobs: Arc<Mutex<Vec<ProofJob>>>,
}

impl FakeSandboxFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the reply channel without answering
    pub fn lose_messages(&self, lose: bool) {
        self.lose_messages.store(lose, Ordering::SeqCst);
    }

    /// Answer with a prover error
    pub fn fail_proofs(&self, fail: bool) {
        self.fail_proofs.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn torn_down(&self) -> usize {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<ProofJob> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl SandboxFactory for FakeSandboxFactory {
    async fn create(&self) -> Result<Box<dyn Sandbox>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Box::new(FakeSandbox {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            lose_messages: self.lose_messages.load(Ordering::SeqCst),
            fail_proofs: self.fail_proofs.load(Ordering::SeqCst),
            torn_down: self.torn_down.clone(),
            jobs: self.jobs.clone(),
        }))
    }
}

struct FakeSandbox {
    tx: Mutex<Option<mpsc::UnboundedSender<SandboxMessage>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SandboxMessage>>,
    lose_messages: bool,
    fail_proofs: bool,
    torn_down: Arc<AtomicUsize>,
    jobs: Arc<Mutex<Vec<ProofJob>>>,
}

#[async_trait]
impl Sandbox for FakeSandbox {
    async fn post(&self, job: ProofJob) -> Result<()> {
        self.jobs.lock().push(job.clone());
        let Some(tx) = self.tx.lock().take() else {
            return Err(Error::TransportError("job already posted".into()));
        };
        if self.lose_messages {
            return Ok(());
        }

        let message = if self.fail_proofs {
            SandboxMessage::Error("witness generation failed".into())
        } else {
            let prover = StaticProver::new();
            match &job {
                ProofJob::Semaphore(r) => SandboxMessage::Result(ProofOutput::Semaphore(prover.semaphore_proof(r).await?)),
                ProofJob::Rln(r) => SandboxMessage::Result(ProofOutput::Rln(prover.rln_proof(r).await?)),
            }
        };
        tx.send(message)
            .map_err(|_| Error::TransportError("context gone".into()))
    }

    async fn next_message(&self) -> Option<SandboxMessage> {
        self.rx.lock().await.recv().await
    }

    async fn teardown(&self) {
        self.tx.lock().take();
        self.torn_down.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub fn artifact_config() -> ArtifactConfig {
    let paths = |name: &str| ArtifactPaths {
        circuit_file_path: format!("/artifacts/{name}.wasm"),
        zkey_file_path: format!("/artifacts/{name}.zkey"),
        verification_key: format!("/artifacts/{name}.json"),
    };

    ArtifactConfig {
        semaphore: Some(paths("semaphore")),
        rln: Some(paths("rln")),
    }
}

pub fn semaphore_request() -> SemaphoreProofRequest {
    SemaphoreProofRequest {
        external_nullifier: "1".into(),
        signal: "0x0".into(),
        merkle: MerkleProofFields {
            merkle_storage_url: Some("https://merkle.test".into()),
            ..Default::default()
        },
    }
}

pub fn prepared_semaphore() -> PreparedProof<SemaphoreProofRequest> {
    let artifacts = artifact_config();
    PreparedProof {
        request: semaphore_request(),
        merkle_proof_source: MerkleProofSource::StorageUrl("https://merkle.test".into()),
        identity_serialized: Some("trapdoor-nullifier".into()),
        artifacts: artifacts.semaphore.unwrap(),
        url_origin: "https://a.test".into(),
    }
}

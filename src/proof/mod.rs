//! # Proof Module
//!
//! Turns a page's proof request into a computed proof.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       PROOF REQUEST PIPELINE                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  prepare_proof(request, origin)                                        │
//! │     1. origin present?                    else OriginMissing           │
//! │     2. identity connected to origin?      else IdentityMissing         │
//! │     3. Merkle source valid?               else Invalid*                │
//! │     4. circuit / zkey locations known?    else ArtifactsMissing        │
//! │     5. canSkipApprove? ── no ──► broker: SEMAPHORE_PROOF | RLN_PROOF   │
//! │                                  (serialized identity stripped)        │
//! │     6. PreparedProof with identity attached                            │
//! │                                                                         │
//! │  dispatch(prepared) ──► ProofDispatcher (sandboxed | in process)       │
//! │                                                                         │
//! │  Any failure: "Error in generating <Semaphore|RLN> proof <message>"    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod dispatch;
mod types;
mod validation;

pub use dispatch::{Platform, ProofDispatcher, Prover, Sandbox, SandboxFactory, SandboxMessage};
pub use types::{
    ArtifactConfig, ArtifactPaths, FieldElement, FullProof, MerkleProof, MerkleProofArtifacts,
    MerkleProofFields, MerkleProofSource, PreparedProof, ProofJob, ProofKind, ProofOutput,
    ProofRequest, RlnFullProof, RlnProofRequest, SemaphoreFullProof, SemaphoreProofRequest,
};
pub use validation::{validate_merkle_proof_source, ArtifactsProofValidator, MerkleProofValidator};

use std::sync::Arc;

use crate::approvals::Approver;
use crate::broker::RequestBroker;
use crate::connections::IdentityResolver;
use crate::error::{Error, Result};

/// Validates, confirms and dispatches proof requests
pub struct ProofRequestPipeline {
    identities: Arc<dyn IdentityResolver>,
    approver: Arc<dyn Approver>,
    broker: Arc<RequestBroker>,
    artifacts: ArtifactConfig,
    dispatcher: ProofDispatcher,
}

impl ProofRequestPipeline {
    /// Create a pipeline
    pub fn new(
        identities: Arc<dyn IdentityResolver>,
        approver: Arc<dyn Approver>,
        broker: Arc<RequestBroker>,
        artifacts: ArtifactConfig,
        dispatcher: ProofDispatcher,
    ) -> Self {
        Self {
            identities,
            approver,
            broker,
            artifacts,
            dispatcher,
        }
    }

    /// The dispatch strategy in use
    pub fn dispatcher(&self) -> &ProofDispatcher {
        &self.dispatcher
    }

    /// Generate a Semaphore proof for `origin`
    pub async fn generate_semaphore_proof(
        &self,
        request: SemaphoreProofRequest,
        origin: &str,
    ) -> Result<SemaphoreFullProof> {
        self.generate_proof(request, origin).await
    }

    /// Generate an RLN proof for `origin`
    pub async fn generate_rln_proof(&self, request: RlnProofRequest, origin: &str) -> Result<RlnFullProof> {
        self.generate_proof(request, origin).await
    }

    /// Prepare and dispatch any proof request
    pub async fn generate_proof<R: ProofRequest>(&self, request: R, origin: &str) -> Result<R::Proof> {
        let result = async {
            let prepared = self.prepare_proof(request, origin).await?;
            self.dispatch(prepared).await
        }
        .await;

        result.map_err(|e| {
            tracing::warn!("{} proof for {} failed: {}", R::KIND, origin, e);
            Error::ProofFailed {
                kind: R::KIND.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Resolve and confirm a request without computing the proof
    pub async fn prepare_proof<R: ProofRequest>(&self, request: R, origin: &str) -> Result<PreparedProof<R>> {
        if origin.is_empty() {
            return Err(Error::OriginMissing);
        }

        let identity = self
            .identities
            .connected_identity(origin)
            .await?
            .ok_or(Error::IdentityMissing)?;

        let merkle_proof_source = validate_merkle_proof_source(&request.merkle().select()?)?;
        let artifacts = self.artifacts.resolve(R::KIND)?;

        let prepared = PreparedProof {
            request,
            merkle_proof_source,
            identity_serialized: Some(identity.serialized().to_string()),
            artifacts,
            url_origin: origin.to_string(),
        };

        if self.approver.can_skip_approve(origin) {
            tracing::debug!("{} proof for {} skips confirmation", R::KIND, origin);
        } else {
            let shown = serde_json::to_value(prepared.without_identity())?;
            self.broker.new_request(R::KIND.request_kind(), shown).await?;
        }

        Ok(prepared)
    }

    /// Compute the proof for a prepared request
    pub async fn dispatch<R: ProofRequest>(&self, prepared: PreparedProof<R>) -> Result<R::Proof> {
        tracing::info!("Dispatching {} proof for {}", R::KIND, prepared.url_origin);
        let output = self.dispatcher.dispatch(R::into_job(prepared)).await?;
        R::from_output(output)
    }
}

// ============================================================================
// TESTS
// ============================================================================

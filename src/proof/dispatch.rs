//! Proof computation strategies.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          PROOF DISPATCH                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Platform probe (once, at startup)                                     │
//! │     │                                                                   │
//! │     ├── isolated context available ──► Sandboxed                       │
//! │     │      create ─► post(job) ─► next_message() ─► teardown (always)  │
//! │     │                                                                   │
//! │     └── not available ───────────────► InProcess                       │
//! │            prover.semaphore_proof / prover.rln_proof                   │
//! │                                                                         │
//! │  Both return ProofOutput.                                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{
    PreparedProof, ProofJob, ProofOutput, RlnFullProof, RlnProofRequest, SemaphoreFullProof,
    SemaphoreProofRequest,
};
use crate::error::{Error, Result};

/// Computes proofs in the current context
#[async_trait]
pub trait Prover: Send + Sync {
    /// Compute a Semaphore proof
    async fn semaphore_proof(
        &self,
        request: &PreparedProof<SemaphoreProofRequest>,
    ) -> Result<SemaphoreFullProof>;

    /// Compute an RLN proof
    async fn rln_proof(&self, request: &PreparedProof<RlnProofRequest>) -> Result<RlnFullProof>;
}

/// Message received from an isolated context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxMessage {
    /// The computed proof
    Result(ProofOutput),
    /// The prover inside the context failed
    Error(String),
}

/// An isolated execution context running one proof job
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Send the job to the context
    async fn post(&self, job: ProofJob) -> Result<()>;

    /// Next message from the context; `None` once the channel is gone
    async fn next_message(&self) -> Option<SandboxMessage>;

    /// Destroy the context
    async fn teardown(&self);
}

/// Creates isolated execution contexts
#[async_trait]
pub trait SandboxFactory: Send + Sync {
    /// Create a fresh context
    async fn create(&self) -> Result<Box<dyn Sandbox>>;
}

/// Capabilities of the host platform
#[derive(Clone, Default)]
pub struct Platform {
    /// Isolated execution contexts, where the platform offers them
    pub sandbox: Option<Arc<dyn SandboxFactory>>,
}

impl Platform {
    /// Platform without isolated execution
    pub fn in_process() -> Self {
        Self::default()
    }

    /// Platform offering isolated execution through `factory`
    pub fn sandboxed(factory: Arc<dyn SandboxFactory>) -> Self {
        Self {
            sandbox: Some(factory),
        }
    }
}

/// Proof computation strategy, chosen once from the [`Platform`]
#[derive(Clone)]
pub enum ProofDispatcher {
    /// Compute inside an isolated context
    Sandboxed(Arc<dyn SandboxFactory>),
    /// Compute in this context
    InProcess(Arc<dyn Prover>),
}

impl ProofDispatcher {
    /// Pick the strategy for `platform`
    pub fn select(platform: &Platform, prover: Arc<dyn Prover>) -> Self {
        match &platform.sandbox {
            Some(factory) => {
                tracing::info!("Proofs will run in an isolated context");
                Self::Sandboxed(factory.clone())
            }
            None => {
                tracing::info!("Proofs will run in process");
                Self::InProcess(prover)
            }
        }
    }

    /// Whether proofs run in an isolated context
    pub fn is_sandboxed(&self) -> bool {
        matches!(self, Self::Sandboxed(_))
    }

    /// Compute the proof for `job`
    pub async fn dispatch(&self, job: ProofJob) -> Result<ProofOutput> {
        match self {
            Self::Sandboxed(factory) => Self::run_sandboxed(factory.as_ref(), job).await,
            Self::InProcess(prover) => match &job {
                ProofJob::Semaphore(request) => prover.semaphore_proof(request).await.map(ProofOutput::Semaphore),
                ProofJob::Rln(request) => prover.rln_proof(request).await.map(ProofOutput::Rln),
            },
        }
    }

    async fn run_sandboxed(factory: &dyn SandboxFactory, job: ProofJob) -> Result<ProofOutput> {
        let sandbox = factory.create().await?;

        let result = async {
            sandbox.post(job).await?;
            match sandbox.next_message().await {
                Some(SandboxMessage::Result(output)) => Ok(output),
                Some(SandboxMessage::Error(message)) => Err(Error::ProverError(message)),
                None => Err(Error::TransportError(
                    "isolated context closed without a result".into(),
                )),
            }
        }
        .await;

        sandbox.teardown().await;
        tracing::debug!("Isolated context torn down");
        result
    }
}

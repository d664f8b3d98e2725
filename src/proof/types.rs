//! Proof request and response types.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::broker::RequestKind;
use crate::error::{Error, Result};

// ============================================================================
// FIELD ELEMENTS
// ============================================================================

/// A field element as sent by pages: decimal or `0x`-prefixed hex
///
/// Accepted from JSON as either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldElement(String);

impl FieldElement {
    /// Wrap a textual field element
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Textual form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the element is zero (an empty value counts as zero)
    pub fn is_zero(&self) -> bool {
        let value = self.0.trim();
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);
        digits.chars().all(|c| c == '0')
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

// ============================================================================
// MERKLE PROOF SOURCES
// ============================================================================

/// Raw tree data the prover builds a Merkle proof from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProofArtifacts {
    /// Tree depth
    pub depth: u32,
    /// Tree leaves
    pub leaves: Vec<FieldElement>,
    /// Tree fan-out
    pub leaves_per_node: u32,
}

/// A fully formed Merkle proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Tree root
    pub root: FieldElement,
    /// Proven leaf
    pub leaf: FieldElement,
    /// Sibling hashes from leaf to root
    pub siblings: Vec<FieldElement>,
    /// Position of the path at each level
    pub path_indices: Vec<u8>,
}

/// Where the prover gets its Merkle proof from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MerkleProofSource {
    /// Remote URL serving the proof
    StorageUrl(String),
    /// Tree data to build the proof from
    Artifacts(MerkleProofArtifacts),
    /// Ready-made proof
    Proof(MerkleProof),
}

/// The three mutually exclusive Merkle fields of a page request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProofFields {
    /// Ready-made proof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_proof_provided: Option<Value>,
    /// Tree data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_proof_artifacts: Option<Value>,
    /// Remote URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_storage_url: Option<String>,
}

impl MerkleProofFields {
    /// The single field that was provided, as raw JSON
    ///
    /// Fails with `InvalidMerkleInputs` unless exactly one is present.
    pub fn select(&self) -> Result<Value> {
        match (
            &self.merkle_proof_provided,
            &self.merkle_proof_artifacts,
            &self.merkle_storage_url,
        ) {
            (Some(proof), None, None) => Ok(proof.clone()),
            (None, Some(artifacts), None) => Ok(artifacts.clone()),
            (None, None, Some(url)) => Ok(Value::String(url.clone())),
            _ => Err(Error::InvalidMerkleInputs),
        }
    }
}

// ============================================================================
// ARTIFACT LOCATIONS
// ============================================================================

/// Circuit and proving-key locations for one proof system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPaths {
    /// Compiled circuit (wasm)
    pub circuit_file_path: String,
    /// Proving key
    pub zkey_file_path: String,
    /// Verification key
    pub verification_key: String,
}

/// Artifact locations available on this platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Semaphore artifacts
    pub semaphore: Option<ArtifactPaths>,
    /// RLN artifacts
    pub rln: Option<ArtifactPaths>,
}

impl ArtifactConfig {
    /// Artifact locations for `kind`
    pub fn resolve(&self, kind: ProofKind) -> Result<ArtifactPaths> {
        let paths = match kind {
            ProofKind::Semaphore => &self.semaphore,
            ProofKind::Rln => &self.rln,
        };

        paths
            .clone()
            .filter(|p| !p.circuit_file_path.is_empty() && !p.zkey_file_path.is_empty())
            .ok_or_else(|| Error::ArtifactsMissing(kind.to_string()))
    }
}

// ============================================================================
// REQUESTS
// ============================================================================

/// Proof system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofKind {
    /// Semaphore signalling proof
    Semaphore,
    /// Rate-limiting nullifier proof
    Rln,
}

impl ProofKind {
    /// Broker request kind used to confirm this proof
    pub fn request_kind(self) -> RequestKind {
        match self {
            Self::Semaphore => RequestKind::SemaphoreProof,
            Self::Rln => RequestKind::RlnProof,
        }
    }
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semaphore => f.write_str("Semaphore"),
            Self::Rln => f.write_str("RLN"),
        }
    }
}

/// Semaphore proof request as sent by a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemaphoreProofRequest {
    /// External nullifier
    pub external_nullifier: String,
    /// Signal
    pub signal: String,
    /// Merkle proof source
    #[serde(flatten)]
    pub merkle: MerkleProofFields,
}

/// RLN proof request as sent by a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlnProofRequest {
    /// RLN application identifier
    pub rln_identifier: String,
    /// Message being rate-limited
    pub message: String,
    /// Epoch
    pub epoch: String,
    /// Messages allowed per epoch
    pub message_limit: u64,
    /// Index of this message within the epoch
    pub message_id: u64,
    /// Merkle proof source
    #[serde(flatten)]
    pub merkle: MerkleProofFields,
}

/// A proof request once origin, identity, Merkle source and artifacts have
/// been resolved
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedProof<R> {
    /// Page request
    #[serde(flatten)]
    pub request: R,
    /// Validated Merkle source
    pub merkle_proof_source: MerkleProofSource,
    /// Serialized identity; absent in anything shown to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_serialized: Option<String>,
    /// Circuit and key locations
    #[serde(flatten)]
    pub artifacts: ArtifactPaths,
    /// Requesting origin
    pub url_origin: String,
}

impl<R: Clone> PreparedProof<R> {
    /// Copy with the serialized identity removed
    pub fn without_identity(&self) -> Self {
        Self {
            identity_serialized: None,
            ..self.clone()
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for PreparedProof<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedProof")
            .field("request", &self.request)
            .field("merkle_proof_source", &self.merkle_proof_source)
            .field(
                "identity_serialized",
                &self.identity_serialized.as_ref().map(|_| "<redacted>"),
            )
            .field("artifacts", &self.artifacts)
            .field("url_origin", &self.url_origin)
            .finish()
    }
}

// ============================================================================
// PROOFS
// ============================================================================

/// A Groth16 proof with its public signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullProof {
    /// Proof object as produced by the prover
    pub proof: Value,
    /// Public signals
    pub public_signals: Vec<String>,
}

/// Result of a Semaphore proof
pub type SemaphoreFullProof = FullProof;

/// Result of an RLN proof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlnFullProof {
    /// Underlying SNARK proof
    pub snark_proof: FullProof,
    /// Epoch the proof is bound to
    pub epoch: String,
    /// RLN application identifier
    pub rln_identifier: String,
}

/// A job handed to a prover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "request", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofJob {
    /// Semaphore job
    Semaphore(PreparedProof<SemaphoreProofRequest>),
    /// RLN job
    Rln(PreparedProof<RlnProofRequest>),
}

/// A prover's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "proof", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofOutput {
    /// Semaphore proof
    Semaphore(SemaphoreFullProof),
    /// RLN proof
    Rln(RlnFullProof),
}

/// Ties a page request type to its proof system
pub trait ProofRequest: Clone + fmt::Debug + Serialize + Send + Sync + 'static {
    /// Proof produced for this request
    type Proof;

    /// Proof system
    const KIND: ProofKind;

    /// Merkle fields of the request
    fn merkle(&self) -> &MerkleProofFields;

    /// Wrap a prepared request as a prover job
    fn into_job(prepared: PreparedProof<Self>) -> ProofJob;

    /// Extract this request's proof from a prover result
    fn from_output(output: ProofOutput) -> Result<Self::Proof>;
}

impl ProofRequest for SemaphoreProofRequest {
    type Proof = SemaphoreFullProof;

    const KIND: ProofKind = ProofKind::Semaphore;

    fn merkle(&self) -> &MerkleProofFields {
        &self.merkle
    }

    fn into_job(prepared: PreparedProof<Self>) -> ProofJob {
        ProofJob::Semaphore(prepared)
    }

    fn from_output(output: ProofOutput) -> Result<Self::Proof> {
        match output {
            ProofOutput::Semaphore(proof) => Ok(proof),
            ProofOutput::Rln(_) => Err(Error::TransportError("expected a Semaphore proof".into())),
        }
    }
}

impl ProofRequest for RlnProofRequest {
    type Proof = RlnFullProof;

    const KIND: ProofKind = ProofKind::Rln;

    fn merkle(&self) -> &MerkleProofFields {
        &self.merkle
    }

    fn into_job(prepared: PreparedProof<Self>) -> ProofJob {
        ProofJob::Rln(prepared)
    }

    fn from_output(output: ProofOutput) -> Result<Self::Proof> {
        match output {
            ProofOutput::Rln(proof) => Ok(proof),
            ProofOutput::Semaphore(_) => Err(Error::TransportError("expected an RLN proof".into())),
        }
    }
}

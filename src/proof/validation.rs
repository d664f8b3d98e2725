//! Merkle proof source validation.
//!
//! ```text
//! raw JSON ─┬─ string ──────────────────────────► StorageUrl (not checked further)
//!           ├─ {depth, leaves, leavesPerNode} ──► ArtifactsProofValidator
//!           │                                     depth → leaves → leavesPerNode
//!           ├─ {root, leaf, siblings, pathIndices} ► MerkleProofValidator
//!           │                                     root → siblings → pathIndices → leaf
//!           └─ anything else ───────────────────► InvalidMerkleInputs
//! ```
//!
//! Each validator stops at the first failing check. The individual checks
//! are public so callers can run any one of them on its own.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::types::{MerkleProof, MerkleProofArtifacts, MerkleProofSource};
use crate::error::{Error, Result};

const ARTIFACT_KEYS: [&str; 3] = ["leaves", "depth", "leavesPerNode"];
const PROOF_KEYS: [&str; 4] = ["root", "leaf", "siblings", "pathIndices"];

/// Checks raw tree data
pub struct ArtifactsProofValidator<'a> {
    artifacts: &'a MerkleProofArtifacts,
}

impl<'a> ArtifactsProofValidator<'a> {
    /// Validator over `artifacts`
    pub fn new(artifacts: &'a MerkleProofArtifacts) -> Self {
        Self { artifacts }
    }

    /// Run every check in order
    pub fn validate_proof(&self) -> Result<()> {
        self.validate_depth()?;
        self.validate_leaves()?;
        self.validate_leaves_per_node()
    }

    /// Depth must be positive
    pub fn validate_depth(&self) -> Result<()> {
        if self.artifacts.depth == 0 {
            return Err(Error::InvalidDepth);
        }
        Ok(())
    }

    /// At least one leaf
    pub fn validate_leaves(&self) -> Result<()> {
        if self.artifacts.leaves.is_empty() {
            return Err(Error::InvalidLeaves);
        }
        Ok(())
    }

    /// Fan-out must be positive
    pub fn validate_leaves_per_node(&self) -> Result<()> {
        if self.artifacts.leaves_per_node == 0 {
            return Err(Error::InvalidLeavesPerNode);
        }
        Ok(())
    }
}

/// Checks a ready-made Merkle proof
pub struct MerkleProofValidator<'a> {
    proof: &'a MerkleProof,
}

impl<'a> MerkleProofValidator<'a> {
    /// Validator over `proof`
    pub fn new(proof: &'a MerkleProof) -> Self {
        Self { proof }
    }

    /// Run every check in order
    pub fn validate_proof(&self) -> Result<()> {
        self.validate_root()?;
        self.validate_siblings()?;
        self.validate_path_indices()?;
        self.validate_leaf()
    }

    /// Root must be non-zero
    pub fn validate_root(&self) -> Result<()> {
        if self.proof.root.is_zero() {
            return Err(Error::InvalidRoot);
        }
        Ok(())
    }

    /// At least one sibling
    pub fn validate_siblings(&self) -> Result<()> {
        if self.proof.siblings.is_empty() {
            return Err(Error::InvalidSiblings);
        }
        Ok(())
    }

    /// At least one path index
    pub fn validate_path_indices(&self) -> Result<()> {
        if self.proof.path_indices.is_empty() {
            return Err(Error::InvalidPathIndices);
        }
        Ok(())
    }

    /// Leaf must be non-zero
    pub fn validate_leaf(&self) -> Result<()> {
        if self.proof.leaf.is_zero() {
            return Err(Error::InvalidLeaf);
        }
        Ok(())
    }
}

/// Classify and validate a raw Merkle proof source
pub fn validate_merkle_proof_source(source: &Value) -> Result<MerkleProofSource> {
    if let Value::String(url) = source {
        return Ok(MerkleProofSource::StorageUrl(url.clone()));
    }

    let Value::Object(fields) = source else {
        return Err(Error::InvalidMerkleInputs);
    };

    if has_keys(fields, &ARTIFACT_KEYS) {
        let artifacts: MerkleProofArtifacts = parse(source)?;
        ArtifactsProofValidator::new(&artifacts).validate_proof()?;
        return Ok(MerkleProofSource::Artifacts(artifacts));
    }

    if has_keys(fields, &PROOF_KEYS) {
        let proof: MerkleProof = parse(source)?;
        MerkleProofValidator::new(&proof).validate_proof()?;
        return Ok(MerkleProofSource::Proof(proof));
    }

    Err(Error::InvalidMerkleInputs)
}

fn has_keys(fields: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().all(|k| fields.contains_key(*k))
}

fn parse<T: DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|_| Error::InvalidMerkleInputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::types::FieldElement;
    use serde_json::json;

    fn artifacts(depth: u32, leaves: usize, leaves_per_node: u32) -> MerkleProofArtifacts {
        MerkleProofArtifacts {
            depth,
            leaves: (1..=leaves).map(|i| FieldElement::new(i.to_string())).collect(),
            leaves_per_node,
        }
    }

    fn proof(root: &str, leaf: &str, siblings: usize, path_indices: usize) -> MerkleProof {
        MerkleProof {
            root: FieldElement::new(root),
            leaf: FieldElement::new(leaf),
            siblings: vec![FieldElement::new("5"); siblings],
            path_indices: vec![0; path_indices],
        }
    }

    #[test]
    fn test_valid_artifacts() {
        for (depth, leaves, per_node) in [(1, 1, 1), (20, 3, 2), (32, 10, 16)] {
            let a = artifacts(depth, leaves, per_node);
            assert!(ArtifactsProofValidator::new(&a).validate_proof().is_ok());
        }
    }

    #[test]
    fn test_artifacts_check_order() {
        let a = artifacts(0, 0, 0);
        assert_eq!(ArtifactsProofValidator::new(&a).validate_proof(), Err(Error::InvalidDepth));

        let a = artifacts(1, 0, 0);
        assert_eq!(ArtifactsProofValidator::new(&a).validate_proof(), Err(Error::InvalidLeaves));

        let a = artifacts(1, 1, 0);
        assert_eq!(
            ArtifactsProofValidator::new(&a).validate_proof(),
            Err(Error::InvalidLeavesPerNode)
        );
    }

    #[test]
    fn test_individual_artifact_checks() {
        let a = artifacts(0, 2, 2);
        let validator = ArtifactsProofValidator::new(&a);

        assert!(validator.validate_leaves().is_ok());
        assert!(validator.validate_leaves_per_node().is_ok());
        assert_eq!(validator.validate_depth(), Err(Error::InvalidDepth));
    }

    #[test]
    fn test_valid_proof() {
        let p = proof("1", "2", 1, 1);
        assert!(MerkleProofValidator::new(&p).validate_proof().is_ok());
    }

    #[test]
    fn test_single_violation_reports_its_own_error() {
        let cases = [
            (proof("0", "2", 1, 1), Error::InvalidRoot),
            (proof("1", "2", 0, 1), Error::InvalidSiblings),
            (proof("1", "2", 1, 0), Error::InvalidPathIndices),
            (proof("1", "0", 1, 1), Error::InvalidLeaf),
        ];

        for (p, expected) in cases {
            assert_eq!(MerkleProofValidator::new(&p).validate_proof(), Err(expected));
        }
    }

    #[test]
    fn test_proof_check_order() {
        let p = proof("0", "0", 0, 0);
        assert_eq!(MerkleProofValidator::new(&p).validate_proof(), Err(Error::InvalidRoot));

        let p = proof("1", "0", 0, 0);
        assert_eq!(MerkleProofValidator::new(&p).validate_proof(), Err(Error::InvalidSiblings));

        let p = proof("1", "0", 1, 0);
        assert_eq!(MerkleProofValidator::new(&p).validate_proof(), Err(Error::InvalidPathIndices));
    }

    #[test]
    fn test_source_classification() {
        assert_eq!(
            validate_merkle_proof_source(&json!("https://merkle.test")).unwrap(),
            MerkleProofSource::StorageUrl("https://merkle.test".into())
        );

        let source = validate_merkle_proof_source(&json!({
            "depth": 20, "leaves": ["1", "2"], "leavesPerNode": 2,
        }))
        .unwrap();
        assert!(matches!(source, MerkleProofSource::Artifacts(_)));

        let source = validate_merkle_proof_source(&json!({
            "root": "1", "leaf": "2", "siblings": ["3"], "pathIndices": [0],
        }))
        .unwrap();
        assert!(matches!(source, MerkleProofSource::Proof(_)));
    }

    #[test]
    fn test_source_is_validated_eagerly() {
        let err = validate_merkle_proof_source(&json!({
            "root": "0", "leaf": "2", "siblings": ["3"], "pathIndices": [0],
        }))
        .unwrap_err();
        assert_eq!(err, Error::InvalidRoot);

        let err = validate_merkle_proof_source(&json!({
            "depth": 0, "leaves": ["1"], "leavesPerNode": 2,
        }))
        .unwrap_err();
        assert_eq!(err, Error::InvalidDepth);
    }

    #[test]
    fn test_unrecognized_source() {
        for source in [json!(42), json!(null), json!({ "root": "1" }), json!({ "depth": "deep", "leaves": [], "leavesPerNode": 1 })] {
            assert_eq!(validate_merkle_proof_source(&source), Err(Error::InvalidMerkleInputs));
        }
    }
}

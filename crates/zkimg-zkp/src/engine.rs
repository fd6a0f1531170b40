//! # Proof Engine
//!
//! Generates and verifies single-transformation proofs.
//!
//! ## Generation
//!
//! [`ProofEngine::generate`] runs the backend on a blocking worker under the
//! caller's deadline. The witness is moved onto that worker and dropped
//! there as soon as the backend returns, so pixel buffers are zeroized
//! whether proving succeeded, failed or timed out.
//!
//! ## Verification
//!
//! [`ProofEngine::verify`] never returns an error: every failure, including
//! a policy refusal or a backend crash, is a rejected
//! [`VerificationOutcome`] with a diagnostic.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zkimg_core::digest::hex_bytes;
use zkimg_core::{CircuitKey, ContentDigest, Deadline};
use zkimg_crypto::{FieldElement, ProofRecordStore};

use crate::artifact::{ArtifactSet, VerificationKey};
use crate::error::ProofGenerationError;
use crate::policy::ProofPolicy;
use crate::traits::{BackendKind, ProvingBackend};
use crate::witness::Witness;

// ---------------------------------------------------------------------------
// Public signals
// ---------------------------------------------------------------------------

/// Public outputs of a transformation circuit: `[input_hash, output_hash]`
/// as decimal strings, the encoding snarkjs reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicSignals(Vec<String>);

impl PublicSignals {
    pub fn from_commitments(input: &FieldElement, output: &FieldElement) -> Self {
        Self(vec![input.to_decimal(), output.to_decimal()])
    }

    /// Raw signals, e.g. as read back from a backend.
    pub fn from_raw(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Decode `(input_hash, output_hash)`. Fails unless there are exactly two
    /// canonical field elements.
    pub fn parse(&self) -> Result<(FieldElement, FieldElement), String> {
        match self.0.as_slice() {
            [input, output] => {
                let input = FieldElement::from_decimal(input).map_err(|e| format!("input hash: {e}"))?;
                let output = FieldElement::from_decimal(output).map_err(|e| format!("output hash: {e}"))?;
                Ok((input, output))
            }
            other => Err(format!("expected 2 public signals, got {}", other.len())),
        }
    }
}

// ---------------------------------------------------------------------------
// Proof
// ---------------------------------------------------------------------------

/// A single-transformation proof.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    backend: BackendKind,
    circuit: CircuitKey,
    verification_key_digest: ContentDigest,
    #[serde(with = "hex_bytes")]
    proof: Vec<u8>,
    public_signals: PublicSignals,
}

impl Proof {
    pub fn new(
        backend: BackendKind,
        circuit: CircuitKey,
        verification_key_digest: ContentDigest,
        proof: Vec<u8>,
        public_signals: PublicSignals,
    ) -> Self {
        Self {
            backend,
            circuit,
            verification_key_digest,
            proof,
            public_signals,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn circuit(&self) -> &CircuitKey {
        &self.circuit
    }

    pub fn verification_key_digest(&self) -> &ContentDigest {
        &self.verification_key_digest
    }

    pub fn bytes(&self) -> &[u8] {
        &self.proof
    }

    pub fn public_signals(&self) -> &PublicSignals {
        &self.public_signals
    }

    /// `(input_hash, output_hash)` this proof attests to.
    pub fn commitments(&self) -> Result<(FieldElement, FieldElement), String> {
        self.public_signals.parse()
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proof")
            .field("backend", &self.backend)
            .field("circuit", &self.circuit.to_string())
            .field("bytes", &self.proof.len())
            .field("public_signals", &self.public_signals)
            .finish()
    }
}

/// Result of checking one proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub valid: bool,
    /// Why the proof was rejected. `None` when valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl VerificationOutcome {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            diagnostic: None,
        }
    }

    pub fn rejected(diagnostic: impl Into<String>) -> Self {
        Self {
            valid: false,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// What the engine writes to the proof record store for every proof it
/// generates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRecord {
    pub circuit: CircuitKey,
    pub backend: BackendKind,
    pub public_signals: PublicSignals,
    pub proof_bytes: usize,
    pub constraint_count: u64,
    pub elapsed_ms: u64,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives a [`ProvingBackend`] for single proofs.
pub struct ProofEngine<B: ProvingBackend> {
    backend: Arc<B>,
    policy: ProofPolicy,
    records: Option<ProofRecordStore>,
}

impl<B: ProvingBackend> ProofEngine<B> {
    pub fn new(backend: Arc<B>, policy: ProofPolicy) -> Self {
        Self {
            backend,
            policy,
            records: None,
        }
    }

    /// Persist a [`ProofRecord`] for every generated proof.
    pub fn with_records(mut self, records: ProofRecordStore) -> Self {
        self.records = Some(records);
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn policy(&self) -> ProofPolicy {
        self.policy
    }

    /// Prove `witness` against `artifact`.
    ///
    /// # Errors
    ///
    /// - [`ProofGenerationError::WitnessShapeMismatch`] when the witness was
    ///   prepared for another circuit.
    /// - [`ProofGenerationError::UnsatisfiedConstraint`] when the post-image
    ///   is not the transformation of the pre-image.
    /// - [`ProofGenerationError::Timeout`] once `deadline` passes.
    pub async fn generate(
        &self,
        artifact: Arc<ArtifactSet>,
        witness: Witness,
        deadline: Deadline,
    ) -> Result<Proof, ProofGenerationError> {
        if deadline.expired() {
            return Err(ProofGenerationError::Timeout);
        }
        if witness.shape() != artifact.shape() {
            return Err(ProofGenerationError::WitnessShapeMismatch {
                side: "circuit",
                expected: artifact.key().to_string(),
                actual: witness
                    .shape()
                    .key()
                    .map(|k| k.to_string())
                    .unwrap_or_else(|e| e.to_string()),
            });
        }

        let backend = self.backend.clone();
        let records = self.records.clone();
        let circuit = artifact.key().clone();
        let task = tokio::task::spawn_blocking(move || -> Result<Proof, ProofGenerationError> {
            let started = Instant::now();
            let signals = witness.public_signals();
            let result = backend.prove(&artifact, &witness, deadline);
            drop(witness);
            let bytes = result?;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let proof = Proof::new(
                backend.kind(),
                artifact.key().clone(),
                *artifact.verification_key().digest(),
                bytes,
                signals,
            );
            if let Some(records) = records {
                let (kind, sig) = artifact.key().store_path();
                let record = ProofRecord {
                    circuit: artifact.key().clone(),
                    backend: proof.backend(),
                    public_signals: proof.public_signals().clone(),
                    proof_bytes: proof.bytes().len(),
                    constraint_count: artifact.constraint_count(),
                    elapsed_ms,
                    generated_at: chrono::Utc::now(),
                };
                if let Err(e) = records.store(&kind, &sig, &record) {
                    tracing::warn!(circuit = %artifact.key(), error = %e, "failed to write proof record");
                }
            }
            tracing::info!(
                circuit = %artifact.key(),
                backend = %proof.backend(),
                elapsed_ms,
                proof_bytes = proof.bytes().len(),
                constraints = artifact.constraint_count(),
                "proof generated"
            );
            Ok(proof)
        });

        let joined = match deadline.remaining() {
            Some(left) => tokio::time::timeout(left, task)
                .await
                .map_err(|_| ProofGenerationError::Timeout)?,
            None => task.await,
        };
        let result = joined.map_err(|e| ProofGenerationError::TaskFailed(e.to_string()))?;
        if let Err(e) = &result {
            match e {
                ProofGenerationError::Timeout => {
                    tracing::warn!(circuit = %circuit, "proof generation timed out")
                }
                _ => tracing::error!(circuit = %circuit, error = %e, "proof generation failed"),
            }
        }
        result
    }

    /// Check `proof` against `vk` and the expected public signals.
    pub fn verify(&self, vk: &VerificationKey, proof: &Proof, expected: &PublicSignals) -> VerificationOutcome {
        if let Err(e) = self.policy.validate(proof.backend()) {
            return VerificationOutcome::rejected(e.to_string());
        }
        if proof.backend() != self.backend.kind() || vk.backend() != proof.backend() {
            return VerificationOutcome::rejected(format!(
                "proof from backend {} cannot be checked by {}",
                proof.backend(),
                self.backend.kind()
            ));
        }
        if proof.circuit() != vk.circuit() {
            return VerificationOutcome::rejected(format!(
                "proof is for circuit {}, key is for {}",
                proof.circuit(),
                vk.circuit()
            ));
        }
        let same_key: bool = proof
            .verification_key_digest()
            .as_bytes()
            .ct_eq(vk.digest().as_bytes())
            .into();
        if !same_key {
            return VerificationOutcome::rejected("proof was made against a different verification key");
        }
        if proof.public_signals() != expected {
            return VerificationOutcome::rejected("public signals do not match the claimed commitments");
        }
        if let Err(e) = expected.parse() {
            return VerificationOutcome::rejected(format!("malformed public signals: {e}"));
        }
        match self.backend.verify(vk, proof.bytes(), expected) {
            Ok(true) => VerificationOutcome::accepted(),
            Ok(false) => VerificationOutcome::rejected("proof does not verify"),
            Err(e) => {
                tracing::warn!(circuit = %proof.circuit(), error = %e, "verifier error");
                VerificationOutcome::rejected(e.to_string())
            }
        }
    }
}

//! # Mock Proving Backend
//!
//! A deterministic, transparent backend for development and tests.
//!
//! ## How It Works
//!
//! - `compile()` writes placeholder constraint-system, proving-key and
//!   verification-key files derived from the circuit key and the trusted
//!   setup fingerprint, so identical inputs always yield identical
//!   artifacts.
//! - `prove()` evaluates every circuit constraint against the witness
//!   (exactly what [`CircuitShape::check`](crate::circuits::CircuitShape::check)
//!   enforces) and, if they hold, returns
//!   `SHA256("zkimg-mock-proof" || vk_digest || signals)`.
//! - `verify()` recomputes that digest.
//!
//! ## Security Warning
//!
//! **NOT ZERO-KNOWLEDGE, NOT SOUND.** Anyone can compute a valid mock proof
//! for any pair of commitments without a witness. A production
//! [`ProofPolicy`](crate::policy::ProofPolicy) rejects these proofs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::json;
use subtle::ConstantTimeEq;
use zkimg_core::{ContentDigest, Deadline, Sha256Accumulator};

use crate::artifact::{ArtifactSet, VerificationKey, CONSTRAINT_SYSTEM_FILE, PROVING_KEY_FILE, VERIFICATION_KEY_FILE};
use crate::engine::PublicSignals;
use crate::error::{CompilationError, ProofGenerationError, VerifyError};
use crate::traits::{BackendKind, CompileOutput, CompileRequest, ProvingBackend};
use crate::witness::Witness;

const PROOF_DOMAIN: &[u8] = b"zkimg-mock-proof";
const KEY_DOMAIN: &[u8] = b"zkimg-mock-key";
const PROOF_LEN: usize = 32;

/// In-process backend. Delays and failures are injectable for tests.
#[derive(Debug, Default)]
pub struct MockBackend {
    compile_delay: Duration,
    prove_delay: Duration,
    failing_compiles: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated compilation time.
    pub fn with_compile_delay(mut self, delay: Duration) -> Self {
        self.compile_delay = delay;
        self
    }

    /// Simulated proving time.
    pub fn with_prove_delay(mut self, delay: Duration) -> Self {
        self.prove_delay = delay;
        self
    }

    /// Make the next `n` compilations fail.
    pub fn fail_next_compiles(&self, n: u32) {
        self.failing_compiles.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failing_compiles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Sleep for `delay` in short slices. `false` if `deadline` passed first.
fn pause(delay: Duration, deadline: Deadline) -> bool {
    const SLICE: Duration = Duration::from_millis(10);
    let mut left = delay;
    while !left.is_zero() {
        if deadline.expired() {
            return false;
        }
        let step = left.min(SLICE);
        std::thread::sleep(step);
        left -= step;
    }
    !deadline.expired()
}

fn binding(vk_digest: &ContentDigest, signals: &PublicSignals) -> Vec<u8> {
    let mut acc = Sha256Accumulator::new();
    acc.update(PROOF_DOMAIN).update(vk_digest.as_bytes());
    for s in signals.as_slice() {
        acc.update(&(s.len() as u64).to_be_bytes()).update(s.as_bytes());
    }
    acc.finalize().as_bytes().to_vec()
}

impl ProvingBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    fn compile(
        &self,
        request: &CompileRequest<'_>,
        deadline: Deadline,
    ) -> Result<CompileOutput, CompilationError> {
        if !pause(self.compile_delay, deadline) {
            return Err(CompilationError::Timeout);
        }
        if self.take_failure() {
            return Err(CompilationError::Backend {
                stage: "mock-compile".to_string(),
                message: "injected failure".to_string(),
            });
        }

        let key = request.key.to_string();
        let setup = request.setup.fingerprint().to_hex();
        let constraints = request.shape.estimated_constraints();
        let io = |e: std::io::Error| CompilationError::Io(e.to_string());
        let pretty = |v: serde_json::Value| serde_json::to_vec_pretty(&v).unwrap_or_default();

        let mut acc = Sha256Accumulator::new();
        acc.update(KEY_DOMAIN).update(key.as_bytes()).update(setup.as_bytes());
        let key_seed = acc.finalize();

        std::fs::write(
            request.out_dir.join(CONSTRAINT_SYSTEM_FILE),
            pretty(json!({
                "circuit": key.as_str(),
                "params": request.shape.params(),
                "constraints": constraints,
            })),
        )
        .map_err(io)?;
        std::fs::write(request.out_dir.join(PROVING_KEY_FILE), key_seed.as_bytes()).map_err(io)?;
        std::fs::write(
            request.out_dir.join(VERIFICATION_KEY_FILE),
            pretty(json!({
                "protocol": BackendKind::Mock.name(),
                "circuit": key.as_str(),
                "setup": setup.as_str(),
                "key": key_seed.to_hex(),
            })),
        )
        .map_err(io)?;

        Ok(CompileOutput {
            constraint_count: constraints,
        })
    }

    fn prove(
        &self,
        artifact: &ArtifactSet,
        witness: &Witness,
        deadline: Deadline,
    ) -> Result<Vec<u8>, ProofGenerationError> {
        if !pause(self.prove_delay, deadline) {
            return Err(ProofGenerationError::Timeout);
        }
        witness
            .shape()
            .check(witness.pre(), witness.post(), witness.aux(), deadline)?;
        Ok(binding(artifact.verification_key().digest(), &witness.public_signals()))
    }

    fn verify(
        &self,
        vk: &VerificationKey,
        proof: &[u8],
        public_signals: &PublicSignals,
    ) -> Result<bool, VerifyError> {
        if proof.len() != PROOF_LEN {
            return Err(VerifyError::MalformedProof(format!(
                "expected {PROOF_LEN} bytes, got {}",
                proof.len()
            )));
        }
        let expected = binding(vk.digest(), public_signals);
        Ok(proof.ct_eq(&expected).into())
    }
}

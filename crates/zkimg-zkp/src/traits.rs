//! # Proving Backend Trait (Sealed)
//!
//! The boundary between protocol logic (artifact identity, witness shape,
//! chain and tile bookkeeping) and the external machinery that actually
//! compiles circuits and produces succinct proofs.
//!
//! ## Sealed Trait
//!
//! `ProvingBackend` is **sealed**: only backends defined in `zkimg-zkp` can
//! implement it. A verifier must not accept proofs from a backend nobody
//! audited.
//!
//! ## Implementations
//!
//! - [`SnarkjsBackend`](crate::snarkjs::SnarkjsBackend): production. Drives
//!   `circom` and `snarkjs` (Groth16 or PLONK) as child processes.
//! - [`MockBackend`](crate::mock::MockBackend) (feature `mock`): evaluates
//!   every circuit constraint in-process and binds the public signals with
//!   SHA-256. No zero-knowledge; rejected by a production
//!   [`ProofPolicy`](crate::policy::ProofPolicy).
//!
//! All methods are blocking. Callers run them on blocking worker threads and
//! pass a [`Deadline`] the backend must honour.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zkimg_core::{CircuitKey, Deadline};

use crate::artifact::{ArtifactSet, TrustedSetup, VerificationKey};
use crate::circuits::CircuitShape;
use crate::engine::PublicSignals;
use crate::error::{CompilationError, ProofGenerationError, VerifyError};
use crate::witness::Witness;

/// The proof system that produced a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process constraint check plus SHA-256 binding. No cryptographic
    /// security.
    Mock,
    /// Groth16 SNARK via snarkjs.
    Groth16,
    /// PLONK via snarkjs.
    Plonk,
}

impl BackendKind {
    /// Whether this backend provides real cryptographic security.
    pub fn is_real(self) -> bool {
        matches!(self, Self::Groth16 | Self::Plonk)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mock => "mock-sha256",
            Self::Groth16 => "groth16",
            Self::Plonk => "plonk",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a backend needs to compile one circuit.
#[derive(Debug)]
pub struct CompileRequest<'a> {
    pub key: &'a CircuitKey,
    pub shape: &'a CircuitShape,
    pub setup: &'a TrustedSetup,
    /// Staging directory. The backend writes
    /// [`CONSTRAINT_SYSTEM_FILE`](crate::artifact::CONSTRAINT_SYSTEM_FILE),
    /// [`PROVING_KEY_FILE`](crate::artifact::PROVING_KEY_FILE) and
    /// [`VERIFICATION_KEY_FILE`](crate::artifact::VERIFICATION_KEY_FILE)
    /// here, plus any auxiliary files it needs at proving time.
    pub out_dir: &'a Path,
}

/// What a successful compilation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOutput {
    pub constraint_count: u64,
}

/// Private module that seals [`ProvingBackend`].
mod private {
    pub trait Sealed {}
}

/// Sealed interface to a circuit compiler plus prover/verifier.
pub trait ProvingBackend: private::Sealed + Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// Compile the circuit and derive its keys into `request.out_dir`.
    ///
    /// # Errors
    ///
    /// [`CompilationError::Timeout`] once `deadline` passes; any partially
    /// written output is discarded by the caller.
    fn compile(
        &self,
        request: &CompileRequest<'_>,
        deadline: Deadline,
    ) -> Result<CompileOutput, CompilationError>;

    /// Produce proof bytes for `witness` against `artifact`. The public
    /// signals are the witness commitments.
    fn prove(
        &self,
        artifact: &ArtifactSet,
        witness: &Witness,
        deadline: Deadline,
    ) -> Result<Vec<u8>, ProofGenerationError>;

    /// Check proof bytes against a verification key and public signals.
    ///
    /// `Ok(false)` means well-formed but invalid.
    fn verify(
        &self,
        vk: &VerificationKey,
        proof: &[u8],
        public_signals: &PublicSignals,
    ) -> Result<bool, VerifyError>;
}

// ---- Sealed trait implementations for authorized backends ----

impl private::Sealed for crate::snarkjs::SnarkjsBackend {}

#[cfg(feature = "mock")]
impl private::Sealed for crate::mock::MockBackend {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_snark_backends_are_real() {
        assert!(!BackendKind::Mock.is_real());
        assert!(BackendKind::Groth16.is_real());
        assert!(BackendKind::Plonk.is_real());
    }

    #[test]
    fn backend_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&BackendKind::Groth16).unwrap(), "\"groth16\"");
        assert_eq!(BackendKind::Mock.to_string(), "mock-sha256");
    }
}

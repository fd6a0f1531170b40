//! # Proof System Errors
//!
//! - [`SetupError`]: the trusted setup or working directories are unusable.
//!   Fatal at startup, never returned per request.
//! - [`CompilationError`]: the circuit compiler failed. `Clone`, because
//!   every caller waiting on the same in-flight compilation receives the
//!   same failure.
//! - [`ArtifactPersistenceError`]: the compiled artifact could not be
//!   written to the store. Attached to an otherwise usable artifact.
//! - [`CacheError`]: what `ensure_artifacts` returns.
//! - [`ProofGenerationError`]: fatal for one proving call.
//! - [`VerifyError`]: backend-level verification trouble. The engine turns
//!   these into a rejected outcome, never into success.

use std::path::PathBuf;

use thiserror::Error;
use zkimg_core::InputError;

/// The trusted setup or working area is unusable.
#[derive(Error, Debug)]
pub enum SetupError {
    /// The powers-of-tau file does not exist.
    #[error("trusted setup file not found: {}", path.display())]
    Missing { path: PathBuf },

    /// The powers-of-tau file exists but cannot be read.
    #[error("trusted setup file {} unreadable: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    /// A working directory could not be created.
    #[error("cannot prepare directory {}: {reason}", path.display())]
    Directory { path: PathBuf, reason: String },
}

/// The external circuit compiler (or key generation) failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilationError {
    /// A compiler or setup stage exited unsuccessfully.
    #[error("{stage} failed: {message}")]
    Backend { stage: String, message: String },

    /// The compile deadline passed before artifacts were produced.
    #[error("circuit compilation timed out")]
    Timeout,

    /// Staging or reading compiled files failed.
    #[error("compilation I/O error: {0}")]
    Io(String),

    /// The compile task ended without producing a result.
    #[error("compilation aborted: {0}")]
    Aborted(String),
}

/// Compiled artifacts could not be published to the backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to persist artifacts for {circuit}: {reason}")]
pub struct ArtifactPersistenceError {
    pub circuit: String,
    pub reason: String,
}

/// Failure of [`ArtifactCache::ensure_artifacts`](crate::cache::ArtifactCache::ensure_artifacts).
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Rejected before any compilation (missing parameter, dimension limit).
    #[error(transparent)]
    Input(#[from] InputError),

    /// The compilation this request joined failed.
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    /// The caller's deadline passed while waiting for artifacts.
    #[error("timed out waiting for circuit artifacts")]
    Timeout,
}

/// A single proving call failed.
#[derive(Error, Debug)]
pub enum ProofGenerationError {
    /// The witness does not have the shape the artifact was compiled for.
    #[error("witness {side} shape mismatch: artifact expects {expected}, witness has {actual}")]
    WitnessShapeMismatch {
        /// `"pre-image"`, `"post-image"` or `"circuit"`.
        side: &'static str,
        expected: String,
        actual: String,
    },

    /// The witness violates a circuit constraint: the post-image is not the
    /// claimed transformation of the pre-image.
    #[error("{circuit} constraint `{constraint}` unsatisfied at ({x},{y}) channel {channel}")]
    UnsatisfiedConstraint {
        circuit: &'static str,
        constraint: &'static str,
        x: u32,
        y: u32,
        channel: u32,
    },

    /// Computing the image commitments failed.
    #[error("commitment error: {0}")]
    Commitment(String),

    /// The proving backend failed.
    #[error("proving backend failed: {0}")]
    Backend(String),

    /// The backend produced public signals other than the witness
    /// commitments.
    #[error("public signal mismatch: {0}")]
    PublicSignalMismatch(String),

    /// The deadline passed before the proof was produced.
    #[error("proof generation timed out")]
    Timeout,

    /// The proving task panicked or was cancelled.
    #[error("proving task failed: {0}")]
    TaskFailed(String),
}

/// Backend-level verification failure.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The proof is structurally malformed.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// The verifier could not run.
    #[error("verifier failed: {0}")]
    Backend(String),
}

/// Anything that can go wrong between a witness and a proof.
#[derive(Error, Debug)]
pub enum ProverError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Proof(#[from] ProofGenerationError),
}

impl ProverError {
    /// Whether the failure was a deadline expiring, at any stage.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Cache(CacheError::Timeout)
                | Self::Cache(CacheError::Compilation(CompilationError::Timeout))
                | Self::Proof(ProofGenerationError::Timeout)
        )
    }

    /// Whether the request itself was at fault.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_) | Self::Cache(CacheError::Input(_)))
    }
}

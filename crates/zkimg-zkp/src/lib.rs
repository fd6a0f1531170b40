//! # zkimg-zkp — Proof System
//!
//! Turns a transformation request into a verifiable proof:
//!
//! - **Circuits** ([`circuits`]): per-kind shapes, the constraints they
//!   enforce, and witness-side rounding remainders.
//! - **Artifact cache** ([`ArtifactCache`]): compiles each circuit key at
//!   most once, persists artifacts, and serves verification keys.
//! - **Proof engine** ([`ProofEngine`]): runs a backend under a deadline and
//!   verifies proofs into a [`VerificationOutcome`].
//! - **Backends** ([`ProvingBackend`]): sealed; [`SnarkjsBackend`] for
//!   production, [`MockBackend`](mock::MockBackend) behind the `mock`
//!   feature.
//! - **Prover** ([`Prover`]): the cache and the engine behind one handle,
//!   configured from a [`ProverConfig`].
//!
//! ## Crate Policy
//!
//! - Witness material never reaches a log line, an error message or a
//!   serialized value. Errors name positions and shapes, never samples.
//! - Verification returns outcomes. It never treats an inconclusive check
//!   as success.

pub mod artifact;
pub mod cache;
pub mod circuits;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod policy;
pub mod prover;
pub mod snarkjs;
pub mod traits;
pub mod witness;

pub use artifact::{ArtifactManifest, ArtifactSet, TrustedSetup, VerificationKey};
pub use cache::{ArtifactCache, CacheSettings};
pub use circuits::{AuxValues, CircuitShape};
pub use config::{parse_override, ConfigError, ProverConfig};
pub use engine::{Proof, ProofEngine, ProofRecord, PublicSignals, VerificationOutcome};
pub use error::{
    ArtifactPersistenceError, CacheError, CompilationError, ProofGenerationError, ProverError, SetupError,
    VerifyError,
};
pub use policy::{PolicyError, PolicyMode, ProofPolicy};
pub use prover::Prover;
pub use snarkjs::{SnarkProtocol, SnarkjsBackend, SnarkjsConfig};
pub use traits::{BackendKind, CompileOutput, CompileRequest, ProvingBackend};
pub use witness::Witness;

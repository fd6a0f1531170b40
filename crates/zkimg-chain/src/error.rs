//! # Chain, Tiling and Service Errors
//!
//! - [`ChainError`]: integrity failures. A chain that raises one is never
//!   partially accepted.
//! - [`ChainProofError`]: proving a chain failed, either on integrity or on
//!   one step's proof.
//! - [`TilingError`] / [`TileVerificationError`]: tile decomposition and
//!   tile set checks.
//! - [`ServiceError`]: everything the boundary operations can return.

use thiserror::Error;
use zkimg_core::{Dimensions, InputError};
use zkimg_crypto::CryptoError;
use zkimg_zkp::{ConfigError, ProverError, SetupError};

use crate::registry::ChainHandle;

/// A chain (or chain bundle) violates an integrity invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// A chain needs at least one step.
    #[error("chain has no steps")]
    EmptyChain,

    /// Step `at_index` does not start where step `at_index - 1` ended.
    #[error("chain broken at step {at_index}: input commitment does not match the previous output")]
    ChainBroken { at_index: usize },

    /// Adding the step would exceed the recursion ceiling.
    #[error("recursion depth {depth} exceeds maximum {max}")]
    MaxDepthExceeded { depth: u32, max: u32 },

    /// A step's proof attests commitments other than the step's.
    #[error("step {index}: proof commitments do not match the step")]
    StepCommitmentMismatch { index: usize },

    /// A step's proof was made for another transformation.
    #[error("step {index}: proof circuit does not match transformation: {reason}")]
    StepTransformationMismatch { index: usize, reason: String },

    /// A step's proof did not verify.
    #[error("step {index}: proof rejected: {diagnostic}")]
    StepProofInvalid { index: usize, diagnostic: String },

    /// A step has not been proven yet.
    #[error("step {index} has no proof")]
    StepUnproven { index: usize },

    /// Steps are missing, duplicated or out of order.
    #[error("step at position {position} claims index {claimed}")]
    StepOutOfOrder { position: usize, claimed: usize },

    /// A recursion link does not recompute.
    #[error("step {index}: recursion link does not recompute")]
    RecursionLinkMismatch { index: usize },

    /// The disclosed initial or final hash is not the chain's.
    #[error("disclosed {which} hash does not match the chain")]
    DisclosedHashMismatch { which: &'static str },

    /// Hashing failed.
    #[error("commitment error: {0}")]
    Commitment(String),
}

impl From<CryptoError> for ChainError {
    fn from(e: CryptoError) -> Self {
        Self::Commitment(e.to_string())
    }
}

/// Proving a chain failed.
#[derive(Error, Debug)]
pub enum ChainProofError {
    #[error(transparent)]
    Integrity(#[from] ChainError),

    /// The step's transformation or images were rejected.
    #[error(transparent)]
    Input(#[from] InputError),

    /// Proof generation for one step failed.
    #[error("step {index}: {source}")]
    Prover {
        index: usize,
        #[source]
        source: ProverError,
    },

    /// The step's witness was consumed by an earlier failed attempt.
    #[error("step {index}: witness no longer available, rebuild the chain")]
    WitnessUnavailable { index: usize },
}

/// Decomposing or proving a tiled image failed.
#[derive(Error, Debug)]
pub enum TilingError {
    #[error(transparent)]
    Input(#[from] InputError),

    /// One tile's proof failed. Remaining tiles were cancelled.
    #[error("tile {index}: {source}")]
    Prover {
        index: usize,
        #[source]
        source: ProverError,
    },

    #[error("aggregation failed: {0}")]
    Aggregation(#[from] CryptoError),

    /// A tile task panicked or was cancelled.
    #[error("tile task failed: {0}")]
    TaskFailed(String),
}

impl TilingError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Prover { source, .. } if source.is_timeout())
    }
}

/// A tile proof set failed verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TileVerificationError {
    #[error("tile proof set is empty")]
    Empty,

    #[error("tile at position {position} has index {index}")]
    IndexNotDense { position: usize, index: usize },

    #[error("tile {index}: proof is for {found}, set is {expected}")]
    KindMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// The set's transformation does not produce its claimed output.
    #[error("transformation produces {expected}, set claims {found}")]
    OutputMismatch { expected: Dimensions, found: Dimensions },

    /// The set does not hold one proof per tile of the partition.
    #[error("partition has {expected} tiles, set holds {found}")]
    PartitionMismatch { expected: usize, found: usize },

    #[error("tile {index}: bounds do not match the partition")]
    TileMismatch { index: usize },

    /// The tile was proven with a circuit other than the one the set's
    /// transformation assigns it.
    #[error("tile {index}: proof circuit does not match the set's transformation")]
    CircuitMismatch { index: usize },

    #[error("tile {index}: placement does not match its output region")]
    PlacementMismatch { index: usize },

    /// The set's transformation, source and tile size admit no layout.
    #[error("invalid tile layout: {0}")]
    InvalidLayout(String),

    #[error("tile {index}: proof rejected: {diagnostic}")]
    ProofInvalid { index: usize, diagnostic: String },

    #[error("tile {index}: result hash does not match the proof")]
    ResultHashMismatch { index: usize },

    #[error("recomputed Merkle root does not match the disclosed root")]
    RootMismatch,

    #[error("aggregation failed: {0}")]
    Aggregation(String),
}

/// Error returned by [`ImageProofService`](crate::service::ImageProofService).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    ChainProof(#[from] ChainProofError),

    #[error(transparent)]
    Tiling(#[from] TilingError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown or expired chain {handle}")]
    UnknownChain { handle: ChainHandle },

    #[error("too many open chains (limit {limit})")]
    TooManyOpenChains { limit: usize },
}

impl ServiceError {
    /// Whether the caller can fix the request and retry.
    pub fn is_input(&self) -> bool {
        match self {
            Self::Input(_) => true,
            Self::Prover(e) => e.is_input(),
            Self::ChainProof(ChainProofError::Input(_)) => true,
            Self::ChainProof(ChainProofError::Prover { source, .. }) => source.is_input(),
            Self::Tiling(TilingError::Input(_)) => true,
            Self::Tiling(TilingError::Prover { source, .. }) => source.is_input(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Prover(e) => e.is_timeout(),
            Self::ChainProof(ChainProofError::Prover { source, .. }) => source.is_timeout(),
            Self::Tiling(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkimg_zkp::CacheError;

    #[test]
    fn chain_broken_names_the_index() {
        let err = ChainError::ChainBroken { at_index: 2 };
        assert!(format!("{err}").contains("step 2"));
    }

    #[test]
    fn depth_error_reports_both_values() {
        let msg = format!("{}", ChainError::MaxDepthExceeded { depth: 101, max: 100 });
        assert!(msg.contains("101") && msg.contains("100"));
    }

    #[test]
    fn timeouts_surface_through_wrappers() {
        let step = ServiceError::from(ChainProofError::Prover {
            index: 1,
            source: ProverError::from(CacheError::Timeout),
        });
        assert!(step.is_timeout());
        assert!(!step.is_input());
        let tile = ServiceError::from(TilingError::Prover {
            index: 0,
            source: ProverError::from(CacheError::Timeout),
        });
        assert!(tile.is_timeout());
    }

    #[test]
    fn input_errors_are_recognised() {
        let err = ServiceError::from(InputError::ZeroDimension { what: "crop width" });
        assert!(err.is_input());
        assert!(!ServiceError::from(ChainError::EmptyChain).is_input());
    }
}

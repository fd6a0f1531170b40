//! # Recursion State Machine
//!
//! Each chain step's proof conceptually attests "the previous proof was
//! valid and this transformation is correct". The attestation is carried by
//! a Poseidon accumulator folded over the chain:
//!
//! ```text
//! acc_{-1} = 0
//! acc_i    = Poseidon4(acc_{i-1}, input_hash_i, output_hash_i, binding_i)
//! binding_i = SHA-256(proof_i) reduced into the field
//! ```
//!
//! The first step is [`RecursionState::Base`]; step `i > 0` is
//! `Recursive { depth: i }`. Depth is capped: advancing past the ceiling is
//! [`ChainError::MaxDepthExceeded`].

use serde::{Deserialize, Serialize};
use zkimg_core::ContentDigest;
use zkimg_crypto::{hash_fields, CryptoError, FieldElement};

use crate::error::ChainError;

/// Default recursion ceiling: 100 recursive folds after the base step.
pub const DEFAULT_MAX_CHAIN_DEPTH: u32 = 100;

/// Position of a step in the recursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecursionState {
    /// First step: nothing to fold in.
    Base,
    /// Folds `depth` earlier steps.
    Recursive { depth: u32 },
}

impl RecursionState {
    pub fn depth(self) -> u32 {
        match self {
            Self::Base => 0,
            Self::Recursive { depth } => depth,
        }
    }

    /// The state of the step after this one.
    pub fn advance(self, max_depth: u32) -> Result<Self, ChainError> {
        let depth = self.depth().saturating_add(1);
        if depth > max_depth {
            return Err(ChainError::MaxDepthExceeded { depth, max: max_depth });
        }
        Ok(Self::Recursive { depth })
    }

    /// The state step `index` must be in.
    pub fn for_index(index: usize) -> Self {
        match index {
            0 => Self::Base,
            i => Self::Recursive {
                depth: u32::try_from(i).unwrap_or(u32::MAX),
            },
        }
    }
}

/// Proof bytes bound into the field.
pub fn proof_binding(proof: &[u8]) -> FieldElement {
    FieldElement::reduce_be_bytes(ContentDigest::sha256(proof).as_bytes())
}

/// One accumulator step.
pub fn fold(
    previous: &FieldElement,
    input_hash: &FieldElement,
    output_hash: &FieldElement,
    proof: &[u8],
) -> Result<FieldElement, CryptoError> {
    hash_fields(&[*previous, *input_hash, *output_hash, proof_binding(proof)])
}

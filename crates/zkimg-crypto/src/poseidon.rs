//! # Poseidon Commitments
//!
//! Circuit-friendly hashing over BN254 using the circom-compatible Poseidon
//! parameters from `light-poseidon`, so every value here can be recomputed
//! inside a circom circuit with `circomlib`'s `Poseidon(n)` template.
//!
//! ## Image commitment
//!
//! ```text
//! state_0 = Poseidon3(width, height, channels)
//! e_j     = sum_{i<31} byte[31j + i] * 256^i      (zero-padded tail)
//! state   = Poseidon12(state, e_{11k} .. e_{11k+10})   (zero-padded tail)
//! ```
//!
//! The header binds the dimensions, so zero padding cannot collide with an
//! image whose last bytes are zero. An image without pixels commits to
//! `state_0`.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use light_poseidon::{Poseidon, PoseidonHasher};

use zkimg_core::PixelMatrix;

use crate::error::CryptoError;
use crate::field::FieldElement;

/// Bytes packed into one field element (31 * 8 < 254 bits).
pub const BYTES_PER_ELEMENT: usize = 31;

/// Packed elements absorbed per permutation, next to the running state.
pub const ABSORB_RATE: usize = 11;

fn poseidon(arity: usize) -> Result<Poseidon<Fr>, CryptoError> {
    Poseidon::<Fr>::new_circom(arity).map_err(|e| CryptoError::Poseidon(e.to_string()))
}

fn permute(hasher: &mut Poseidon<Fr>, inputs: &[Fr]) -> Result<Fr, CryptoError> {
    hasher
        .hash(inputs)
        .map_err(|e| CryptoError::Poseidon(e.to_string()))
}

/// `Poseidon(inputs)` for 1 to 12 inputs.
pub fn hash_fields(inputs: &[FieldElement]) -> Result<FieldElement, CryptoError> {
    let frs: Vec<Fr> = inputs.iter().map(FieldElement::to_fr).collect();
    let mut hasher = poseidon(frs.len())?;
    permute(&mut hasher, &frs).map(FieldElement::from_fr)
}

/// Interior Merkle node: `Poseidon2(left, right)`.
pub fn node_hash(left: &FieldElement, right: &FieldElement) -> Result<FieldElement, CryptoError> {
    hash_fields(&[*left, *right])
}

/// Reusable two-to-one hasher for folding many nodes without rebuilding the
/// round constants each time.
pub struct NodeHasher {
    inner: Poseidon<Fr>,
}

impl NodeHasher {
    pub fn new() -> Result<Self, CryptoError> {
        Ok(Self { inner: poseidon(2)? })
    }

    pub fn hash(&mut self, left: &FieldElement, right: &FieldElement) -> Result<FieldElement, CryptoError> {
        permute(&mut self.inner, &[left.to_fr(), right.to_fr()]).map(FieldElement::from_fr)
    }
}

/// Commitment to an image's shape and pixel data.
pub fn image_commitment(image: &PixelMatrix) -> Result<FieldElement, CryptoError> {
    let mut header = poseidon(3)?;
    let mut state = permute(
        &mut header,
        &[
            Fr::from(u64::from(image.width())),
            Fr::from(u64::from(image.height())),
            Fr::from(u64::from(image.channels())),
        ],
    )?;

    let data = image.data();
    if data.is_empty() {
        return Ok(FieldElement::from_fr(state));
    }

    let mut sponge = poseidon(ABSORB_RATE + 1)?;
    let mut block = [Fr::from(0u64); ABSORB_RATE + 1];
    for group in data.chunks(BYTES_PER_ELEMENT * ABSORB_RATE) {
        block[0] = state;
        for (slot, chunk) in block[1..].iter_mut().zip(
            group
                .chunks(BYTES_PER_ELEMENT)
                .map(Some)
                .chain(std::iter::repeat(None)),
        ) {
            *slot = match chunk {
                Some(bytes) => Fr::from_le_bytes_mod_order(bytes),
                None => Fr::from(0u64),
            };
        }
        state = permute(&mut sponge, &block)?;
    }
    Ok(FieldElement::from_fr(state))
}

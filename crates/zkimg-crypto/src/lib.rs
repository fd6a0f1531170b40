//! # zkimg-crypto — Commitment Primitives
//!
//! - **Field elements** ([`FieldElement`]): canonical BN254 scalars with hex
//!   and decimal renderings.
//! - **Poseidon commitments** ([`image_commitment`], [`node_hash`]): the
//!   circuit-friendly hash binding images, Merkle nodes and chain links.
//! - **Merkle folding** ([`MerkleTree`]): the tile aggregation tree, with
//!   odd nodes promoted rather than padded.
//! - **Stores** ([`ArtifactStore`], [`ProofRecordStore`]): filesystem
//!   persistence with atomic publish.

pub mod error;
pub mod field;
pub mod merkle;
pub mod poseidon;
pub mod store;

pub use error::CryptoError;
pub use field::FieldElement;
pub use merkle::{merkle_root, root_from_path, MerkleTree, PathStep};
pub use poseidon::{hash_fields, image_commitment, node_hash, NodeHasher};
pub use store::{file_digest, verify_file_digest, ArtifactStore, ProofRecordStore, MANIFEST_FILE};

//! # zkimg-chain — Proof Chains, Tiling and the Service Boundary
//!
//! - **Chains** ([`ProofChain`]): hash-linked transformation steps, proven
//!   in order, folded through a bounded [`RecursionState`] machine.
//! - **Tiling** ([`TileProcessor`]): per-tile proofs for images above the
//!   single-circuit limit, aggregated into a Merkle root.
//! - **Registry** ([`ChainRegistry`]): open chains with a TTL and a size
//!   bound.
//! - **Service** ([`ImageProofService`]): the four boundary operations,
//!   configured from a [`ServiceConfig`].
//!
//! ## Disclosure
//!
//! A [`ChainResult`] or [`TileProofSet`] carries commitments, proofs and
//! transformation parameters. Pixel data never enters either.

pub mod chain;
pub mod config;
pub mod error;
pub mod recursion;
pub mod registry;
pub mod service;
pub mod tiling;

pub use chain::{verify_chain, verify_continuity, ChainResult, ChainStep, ProofChain};
pub use config::{BackendConfig, ServiceConfig};
pub use error::{ChainError, ChainProofError, ServiceError, TileVerificationError, TilingError};
pub use recursion::{RecursionState, DEFAULT_MAX_CHAIN_DEPTH};
pub use registry::{ChainHandle, ChainRegistry};
pub use service::{ImageProofService, StepReceipt};
pub use tiling::{partition, verify_tile_proofs, Tile, TileOutcome, TileProcessor, TileProof, TileProofSet, TileSettings};

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use zkimg_core::{ColorSpace, PixelMatrix};
    use zkimg_zkp::mock::MockBackend;
    use zkimg_zkp::{PolicyMode, Prover, ProverConfig};

    use crate::config::{BackendConfig, ServiceConfig};

    pub fn gradient(w: u32, h: u32) -> PixelMatrix {
        PixelMatrix::from_fn(w, h, ColorSpace::Rgb, |x, y, c| (x * 7 + y * 13 + c * 29) as u8)
    }

    pub fn prover_config(root: &Path, max_dimension: u32) -> ProverConfig {
        let ptau = root.join("pot.ptau");
        std::fs::write(&ptau, b"ceremony").unwrap();
        ProverConfig {
            artifact_dir: root.join("artifacts"),
            work_dir: root.join("work"),
            setup_path: ptau,
            max_dimension,
            proof_policy: Some(PolicyMode::Development),
            ..ProverConfig::default()
        }
    }

    pub fn mock_prover(root: &Path) -> Prover<MockBackend> {
        mock_prover_with_limit(root, 64)
    }

    pub fn mock_prover_with_limit(root: &Path, max_dimension: u32) -> Prover<MockBackend> {
        Prover::new(&prover_config(root, max_dimension), Arc::new(MockBackend::new())).unwrap()
    }

    pub fn mock_service_config(root: &Path) -> ServiceConfig {
        ServiceConfig {
            prover: prover_config(root, 32),
            tile_size: 16,
            tile_workers: 2,
            backend: BackendConfig::Mock,
            ..ServiceConfig::default()
        }
    }
}

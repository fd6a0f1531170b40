//! Shared fixtures: a mock-backed service rooted in a temp directory.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use zkimg_chain::{BackendConfig, ImageProofService, ServiceConfig};
use zkimg_core::{ColorSpace, PixelMatrix};
use zkimg_zkp::mock::MockBackend;
use zkimg_zkp::{PolicyMode, ProverConfig};

pub fn config(root: &Path, max_dimension: u32) -> ServiceConfig {
    let ptau = root.join("pot_final.ptau");
    if !ptau.exists() {
        std::fs::write(&ptau, b"integration ceremony").unwrap();
    }
    ServiceConfig {
        prover: ProverConfig {
            artifact_dir: root.join("artifacts"),
            work_dir: root.join("work"),
            setup_path: ptau,
            max_dimension,
            proof_records_dir: Some(root.join("records")),
            proof_policy: Some(PolicyMode::Development),
            ..ProverConfig::default()
        },
        tile_size: (max_dimension / 2).max(1),
        backend: BackendConfig::Mock,
        ..ServiceConfig::default()
    }
}

pub fn service(root: &Path, max_dimension: u32) -> ImageProofService<MockBackend> {
    service_with(root, max_dimension, MockBackend::new())
}

pub fn service_with(root: &Path, max_dimension: u32, backend: MockBackend) -> ImageProofService<MockBackend> {
    ImageProofService::new(&config(root, max_dimension), Arc::new(backend)).unwrap()
}

/// Deterministic RGB test card.
pub fn test_card(width: u32, height: u32) -> PixelMatrix {
    PixelMatrix::from_fn(width, height, ColorSpace::Rgb, |x, y, c| {
        let v = x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ c.wrapping_mul(101);
        (v % 251) as u8
    })
}

/// Number of entries under `dir`, zero when it does not exist.
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

//! # zkimg-cli — Operator Tooling
//!
//! Backs the `zkimg` binary:
//!
//! - `zkimg verify <bundle.json>`: check a chain bundle or tile proof set.
//!   Exit code 0 when valid, 1 otherwise.
//! - `zkimg warm --kind <k> --param name=value ...`: compile one circuit
//!   into the artifact store ahead of traffic.
//! - `zkimg inspect <bundle.json>`: print the disclosed commitments and the
//!   circuit behind every proof.
//!
//! Configuration comes from `--config <file.yaml>` (optional) layered
//! under `ZKIMG_*` environment variables.

pub mod inspect;
pub mod verify;
pub mod warm;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zkimg_chain::{BackendConfig, ChainResult, ImageProofService, ServiceConfig, TileProofSet};
use zkimg_zkp::mock::MockBackend;
use zkimg_zkp::{ProvingBackend, SnarkjsBackend};

/// Anything `verify` and `inspect` accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bundle {
    Chain(ChainResult),
    Tiles(TileProofSet),
}

/// Read a JSON chain bundle or tile proof set.
pub fn read_bundle(path: &Path) -> Result<Bundle> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is neither a chain bundle nor a tile proof set", path.display()))
}

pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let config = match path {
        Some(path) => ServiceConfig::from_yaml_file(path)?,
        None => ServiceConfig::from_env()?,
    };
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// Subcommands that need a proving service.
#[derive(Debug)]
pub enum ServiceCommand {
    /// Verify a chain bundle or tile proof set.
    Verify(verify::VerifyArgs),
    /// Precompile a circuit into the artifact store.
    Warm(warm::WarmArgs),
}

/// Build the service for the configured backend and run `command`.
pub async fn run_service_command(command: &ServiceCommand, config: &ServiceConfig) -> Result<u8> {
    match &config.backend {
        BackendConfig::Mock => {
            tracing::warn!("using the mock backend; proofs are not zero-knowledge");
            dispatch(command, config, Arc::new(MockBackend::new())).await
        }
        BackendConfig::Snarkjs(snarkjs) => {
            dispatch(command, config, Arc::new(SnarkjsBackend::new(snarkjs.clone()))).await
        }
    }
}

async fn dispatch<B: ProvingBackend>(command: &ServiceCommand, config: &ServiceConfig, backend: Arc<B>) -> Result<u8> {
    let service = ImageProofService::new(config, backend).context("starting proof service")?;
    match command {
        ServiceCommand::Verify(args) => verify::run_verify(args, &service),
        ServiceCommand::Warm(args) => warm::run_warm(args, &service).await,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use zkimg_chain::{BackendConfig, ServiceConfig};
    use zkimg_core::{ColorSpace, PixelMatrix};
    use zkimg_zkp::{PolicyMode, ProverConfig};

    pub fn mock_config(root: &Path) -> ServiceConfig {
        let ptau = root.join("pot.ptau");
        std::fs::write(&ptau, b"ceremony").unwrap();
        ServiceConfig {
            prover: ProverConfig {
                artifact_dir: root.join("artifacts"),
                work_dir: root.join("work"),
                setup_path: ptau,
                max_dimension: 32,
                proof_policy: Some(PolicyMode::Development),
                ..ProverConfig::default()
            },
            tile_size: 16,
            backend: BackendConfig::Mock,
            ..ServiceConfig::default()
        }
    }

    pub fn image(w: u32, h: u32) -> PixelMatrix {
        PixelMatrix::from_fn(w, h, ColorSpace::Rgb, |x, y, c| (x * 5 + y * 3 + c * 17) as u8)
    }
}

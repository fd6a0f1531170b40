//! `zkimg verify`: check a bundle against locally known verification keys.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use zkimg_chain::ImageProofService;
use zkimg_zkp::ProvingBackend;

use crate::{read_bundle, Bundle};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Chain bundle or tile proof set (JSON).
    pub bundle: PathBuf,
}

/// Exit code 0 for a valid bundle, 1 otherwise.
pub fn run_verify<B: ProvingBackend>(args: &VerifyArgs, service: &ImageProofService<B>) -> Result<u8> {
    let bundle = read_bundle(&args.bundle)?;
    let verdict = match &bundle {
        Bundle::Chain(chain) => service
            .verify_external_chain_detailed(chain)
            .map(|(initial, last)| format!("chain of {} steps, initial {initial}, final {last}", chain.steps.len()))
            .map_err(|e| e.to_string()),
        Bundle::Tiles(set) => service
            .verify_tile_proofs_detailed(set)
            .map(|root| format!("{} over {} tiles, root {root}", set.transformation, set.tiles.len()))
            .map_err(|e| e.to_string()),
    };
    match verdict {
        Ok(summary) => {
            println!("VALID: {summary}");
            Ok(0)
        }
        Err(reason) => {
            println!("INVALID: {reason}");
            Ok(1)
        }
    }
}

//! `zkimg inspect`: print what a bundle discloses.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_json::{json, Value};

use crate::{read_bundle, Bundle};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Chain bundle or tile proof set (JSON).
    pub bundle: PathBuf,
}

pub fn run_inspect(args: &InspectArgs) -> Result<u8> {
    let bundle = read_bundle(&args.bundle)?;
    println!("{}", serde_json::to_string_pretty(&summarize(&bundle))?);
    Ok(0)
}

/// Commitments and circuit keys, without proof bytes.
pub fn summarize(bundle: &Bundle) -> Value {
    match bundle {
        Bundle::Chain(chain) => json!({
            "type": "chain",
            "initial_hash": chain.initial_hash,
            "final_hash": chain.final_hash,
            "steps": chain.steps.iter().map(|step| json!({
                "index": step.index,
                "transformation": step.transformation.to_string(),
                "depth": step.state.depth(),
                "input_hash": step.input_hash,
                "output_hash": step.output_hash,
                "circuit": step.proof.as_ref().map(|p| p.circuit().to_string()),
                "backend": step.proof.as_ref().map(|p| p.backend().to_string()),
            })).collect::<Vec<_>>(),
        }),
        Bundle::Tiles(set) => json!({
            "type": "tiles",
            "transformation": set.transformation.to_string(),
            "source": set.source.to_string(),
            "output": set.output.to_string(),
            "tile_size": set.tile_size,
            "root": set.root,
            "tiles": set.tiles.iter().map(|tile| json!({
                "index": tile.tile.index,
                "source_region": tile.tile.rect(),
                "placement": tile.placement,
                "result_hash": tile.result_hash,
                "circuit": tile.proof.circuit().to_string(),
            })).collect::<Vec<_>>(),
        }),
    }
}

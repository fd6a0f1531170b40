//! `zkimg warm`: compile one circuit into the artifact store.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use zkimg_chain::ImageProofService;
use zkimg_core::{CircuitParams, TransformKind};
use zkimg_zkp::ProvingBackend;

#[derive(Args, Debug)]
pub struct WarmArgs {
    /// Circuit kind: crop, resize or grayscale.
    #[arg(long)]
    pub kind: String,

    /// Circuit parameter as `name=value`. Repeat for each parameter.
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, u32)>,
}

/// Parse `name=value` with a `u32` value.
pub fn parse_param(raw: &str) -> Result<(String, u32), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty parameter name in {raw:?}"));
    }
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("parameter {name}: {e}"))?;
    Ok((name.to_string(), value))
}

pub async fn run_warm<B: ProvingBackend>(args: &WarmArgs, service: &ImageProofService<B>) -> Result<u8> {
    let kind = TransformKind::parse(&args.kind)
        .ok_or_else(|| anyhow!("unknown circuit kind {:?} (expected crop, resize or grayscale)", args.kind))?;
    let mut params = CircuitParams::new();
    for (name, value) in &args.params {
        params.insert(name, *value);
    }
    let cache = service.prover().cache();
    let artifact = cache
        .ensure_artifacts(kind, &params)
        .await
        .with_context(|| format!("warming {kind} circuit"))?;
    println!(
        "{} ready in {} ({} constraints, {} compilations this run)",
        artifact.key(),
        artifact.dir().display(),
        artifact.constraint_count(),
        cache.compilations()
    );
    Ok(0)
}

//! # Image Proof Service
//!
//! The boundary the request-handling layer calls:
//!
//! - [`submit_transformation_step`](ImageProofService::submit_transformation_step)
//!   applies and proves one transformation, opening a chain or extending
//!   an open one.
//! - [`finalize_chain`](ImageProofService::finalize_chain) returns the
//!   shareable bundle and closes the chain.
//! - [`verify_external_chain`](ImageProofService::verify_external_chain)
//!   checks a bundle from anywhere. It never compiles.
//! - [`process_large_image`](ImageProofService::process_large_image) proves
//!   images above the single-circuit limit tile by tile.

use std::sync::Arc;
use std::time::Duration;

use zkimg_core::{Deadline, PixelMatrix, Transformation};
use zkimg_crypto::FieldElement;
use zkimg_zkp::{Prover, ProvingBackend};

use crate::chain::{verify_chain, ChainResult, ChainStep, ProofChain};
use crate::config::ServiceConfig;
use crate::error::{ChainError, ServiceError, TileVerificationError};
use crate::registry::{ChainHandle, ChainRegistry};
use crate::tiling::{verify_tile_proofs, TileOutcome, TileProcessor, TileProofSet};

/// What one submitted step hands back.
#[derive(Debug)]
pub struct StepReceipt {
    /// Pass as the prior handle to extend the chain.
    pub handle: ChainHandle,
    pub step: ChainStep,
    /// The transformed image, input to the next step.
    pub output: PixelMatrix,
}

pub struct ImageProofService<B: ProvingBackend> {
    prover: Prover<B>,
    registry: Arc<ChainRegistry>,
    tiles: TileProcessor<B>,
    max_chain_depth: u32,
}

impl<B: ProvingBackend> std::fmt::Debug for ImageProofService<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProofService")
            .field("prover", &self.prover)
            .field("open_chains", &self.registry.len())
            .field("tiles", &self.tiles)
            .field("max_chain_depth", &self.max_chain_depth)
            .finish()
    }
}

impl<B: ProvingBackend> ImageProofService<B> {
    /// Validate `config`, load the trusted setup and open the stores.
    pub fn new(config: &ServiceConfig, backend: Arc<B>) -> Result<Self, ServiceError> {
        config.validate()?;
        let prover = Prover::new(&config.prover, backend)?;
        Ok(Self::with_prover(prover, config))
    }

    pub fn with_prover(prover: Prover<B>, config: &ServiceConfig) -> Self {
        Self {
            tiles: TileProcessor::new(prover.clone(), config.tile_settings()),
            registry: Arc::new(ChainRegistry::new(config.chain_ttl(), config.max_open_chains)),
            max_chain_depth: config.max_chain_depth,
            prover,
        }
    }

    pub fn prover(&self) -> &Prover<B> {
        &self.prover
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// Sweep expired chains in the background at a quarter of the TTL.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let period = (self.registry.ttl() / 4).max(Duration::from_secs(1));
        self.registry.spawn_sweeper(period)
    }

    /// Apply `transformation` to `input`, prove it, and append it to the
    /// chain `prior` (or a new chain).
    pub async fn submit_transformation_step(
        &self,
        prior: Option<ChainHandle>,
        input: PixelMatrix,
        transformation: Transformation,
    ) -> Result<StepReceipt, ServiceError> {
        self.submit_transformation_step_within(prior, input, transformation, self.prover.default_deadline())
            .await
    }

    /// [`submit_transformation_step`](Self::submit_transformation_step)
    /// under an explicit deadline.
    ///
    /// Parameters are validated before the chain is looked up, so a bad
    /// request leaves no trace. A step whose proof fails is dropped from
    /// the chain; earlier steps stay proven.
    pub async fn submit_transformation_step_within(
        &self,
        prior: Option<ChainHandle>,
        input: PixelMatrix,
        transformation: Transformation,
        deadline: Deadline,
    ) -> Result<StepReceipt, ServiceError> {
        self.prover.shape_for(&transformation, input.dims(), input.color())?;
        let output = transformation.apply(&input)?;

        let (handle, shared, opened) = match prior {
            Some(handle) => {
                let chain = self.registry.get(&handle).ok_or(ServiceError::UnknownChain { handle })?;
                (handle, chain, false)
            }
            None => {
                let (handle, chain) = self
                    .registry
                    .open(ProofChain::new(self.max_chain_depth))
                    .map_err(|full| ServiceError::TooManyOpenChains { limit: full.limit })?;
                (handle, chain, true)
            }
        };

        let mut chain = shared.lock().await;
        let proven = match chain.add_step(input, output.clone(), transformation) {
            Ok(step) => chain
                .generate_chain_proofs(&self.prover, deadline)
                .await
                .map(|_| step.index)
                .map_err(ServiceError::from),
            Err(e) => Err(e.into()),
        };
        match proven {
            Ok(index) => {
                let step = chain.steps()[index].clone();
                tracing::info!(chain = %handle, chain_step = index, %transformation, "step accepted");
                Ok(StepReceipt { handle, step, output })
            }
            Err(e) => {
                chain.discard_unproven();
                if opened && chain.is_empty() {
                    drop(chain);
                    self.registry.remove(&handle);
                }
                tracing::warn!(chain = %handle, %transformation, error = %e, "step rejected");
                Err(e)
            }
        }
    }

    /// The bundle for a fully proven chain. Closes the chain.
    pub async fn finalize_chain(&self, handle: ChainHandle) -> Result<ChainResult, ServiceError> {
        let shared = self.registry.get(&handle).ok_or(ServiceError::UnknownChain { handle })?;
        let result = shared.lock().await.result()?;
        self.registry.remove(&handle);
        tracing::info!(
            chain = %handle,
            steps = result.steps.len(),
            initial_hash = %result.initial_hash,
            final_hash = %result.final_hash,
            "chain finalized"
        );
        Ok(result)
    }

    /// Whether `bundle` is a valid chain. Never compiles.
    pub fn verify_external_chain(&self, bundle: &ChainResult) -> bool {
        self.verify_external_chain_detailed(bundle).is_ok()
    }

    /// Like [`verify_external_chain`](Self::verify_external_chain), with the
    /// first failure. Returns the disclosed `(initial_hash, final_hash)`.
    pub fn verify_external_chain_detailed(
        &self,
        bundle: &ChainResult,
    ) -> Result<(FieldElement, FieldElement), ChainError> {
        let verdict = verify_chain(bundle, &self.prover, self.max_chain_depth);
        if let Err(e) = &verdict {
            tracing::info!(steps = bundle.steps.len(), error = %e, "external chain rejected");
        }
        verdict
    }

    /// Prove `transformation` of an image of any size.
    pub async fn process_large_image(
        &self,
        image: &PixelMatrix,
        transformation: Transformation,
    ) -> Result<TileOutcome, ServiceError> {
        self.process_large_image_within(image, transformation, self.prover.default_deadline())
            .await
    }

    pub async fn process_large_image_within(
        &self,
        image: &PixelMatrix,
        transformation: Transformation,
        deadline: Deadline,
    ) -> Result<TileOutcome, ServiceError> {
        Ok(self.tiles.process(image, transformation, deadline).await?)
    }

    pub fn verify_tile_proofs(&self, set: &TileProofSet) -> bool {
        self.verify_tile_proofs_detailed(set).is_ok()
    }

    pub fn verify_tile_proofs_detailed(&self, set: &TileProofSet) -> Result<FieldElement, TileVerificationError> {
        verify_tile_proofs(set, &self.prover)
    }
}

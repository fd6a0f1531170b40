//! # Tile Decomposer and Aggregator
//!
//! Proves transformations of images larger than one circuit accepts by
//! splitting the source into a grid of tiles, proving each tile with its
//! own small circuit, and folding the tile result commitments into a
//! binary Merkle root.
//!
//! ## Tile-local circuits
//!
//! | Kind      | Witnessed input               | Proven output                        |
//! |-----------|-------------------------------|--------------------------------------|
//! | Crop      | the tile                      | tile ∩ crop (0x0 when disjoint)      |
//! | Resize    | the tile + 1px right/bottom halo | outputs whose top-left tap is in the tile |
//! | Grayscale | the tile                      | the tile                             |
//!
//! Every output pixel is owned by exactly one tile, so the placements of
//! all tile results tile the assembled output.
//!
//! ## Bypass
//!
//! An image that fits one circuit is proven whole. The set then holds a
//! single tile and the root equals that tile's result commitment, the same
//! value an untiled proof discloses.
//!
//! ## Verification
//!
//! [`verify_tile_proofs`] rebuilds the layout from the set's own
//! transformation, source, output and tile size, and requires every tile,
//! circuit and placement to match it. A set proven for another
//! transformation, or missing tiles, is rejected even when its root
//! recomputes.
//!
//! ## Ordering
//!
//! Tiles are proven concurrently under a semaphore. Results are re-ordered
//! by tile index before folding; the root never depends on completion
//! order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use zkimg_core::arith::axis_sample;
use zkimg_core::{ColorSpace, Deadline, Dimensions, InputError, PixelMatrix, Rect, TransformKind, Transformation};
use zkimg_crypto::{merkle_root, FieldElement};
use zkimg_zkp::circuits::{CropShape, GrayscaleShape, ResizeShape};
use zkimg_zkp::{CircuitShape, Proof, Prover, ProvingBackend};

use crate::error::{TileVerificationError, TilingError};

/// Default tile edge length.
pub const DEFAULT_TILE_SIZE: u32 = 256;
/// Default number of tiles proven concurrently.
pub const DEFAULT_TILE_WORKERS: usize = 4;
/// Default ceiling on tiles per image.
pub const DEFAULT_MAX_TILES: usize = 4096;

/// A rectangular region of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub index: usize,
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
}

impl Tile {
    pub fn rect(&self) -> Rect {
        Rect::new(self.offset_x, self.offset_y, self.width, self.height)
    }
}

/// Row-major grid of `tile_size` tiles covering `dims`. The last row and
/// column may be smaller.
pub fn partition(dims: Dimensions, tile_size: u32) -> Result<Vec<Tile>, InputError> {
    if tile_size == 0 {
        return Err(InputError::ZeroDimension { what: "tile size" });
    }
    if dims.is_empty() {
        return Err(InputError::ZeroDimension { what: "source image" });
    }
    let mut tiles = Vec::with_capacity(tile_count(dims, tile_size));
    for offset_y in (0..dims.height).step_by(tile_size as usize) {
        for offset_x in (0..dims.width).step_by(tile_size as usize) {
            tiles.push(Tile {
                index: tiles.len(),
                offset_x,
                offset_y,
                width: tile_size.min(dims.width - offset_x),
                height: tile_size.min(dims.height - offset_y),
            });
        }
    }
    Ok(tiles)
}

/// Number of tiles [`partition`] produces.
pub fn tile_count(dims: Dimensions, tile_size: u32) -> usize {
    if tile_size == 0 {
        return 0;
    }
    dims.width.div_ceil(tile_size) as usize * dims.height.div_ceil(tile_size) as usize
}

/// Proof for one tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileProof {
    pub tile: Tile,
    /// Where the tile's result sits in the assembled output.
    pub placement: Rect,
    /// Commitment to the tile's result; the Merkle leaf.
    pub result_hash: FieldElement,
    pub proof: Proof,
}

/// Every tile proof of one transformation plus the folded root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileProofSet {
    pub transformation: Transformation,
    pub source: Dimensions,
    pub output: Dimensions,
    /// Edge length the source was partitioned with. Unused by a bypass set.
    pub tile_size: u32,
    /// Disclosed commitment to the assembled output.
    pub root: FieldElement,
    pub tiles: Vec<TileProof>,
}

/// Result of [`TileProcessor::process`].
#[derive(Debug)]
pub struct TileOutcome {
    pub result_image: PixelMatrix,
    pub set: TileProofSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSettings {
    pub tile_size: u32,
    pub workers: usize,
    pub max_tiles: usize,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            workers: DEFAULT_TILE_WORKERS,
            max_tiles: DEFAULT_MAX_TILES,
        }
    }
}

/// One tile's circuit and witness, ready to prove.
struct TilePlan {
    tile: Tile,
    shape: CircuitShape,
    placement: Rect,
    pre: PixelMatrix,
}

/// Drives per-tile proofs through a [`Prover`].
pub struct TileProcessor<B: ProvingBackend> {
    prover: Prover<B>,
    settings: TileSettings,
    permits: Arc<Semaphore>,
}

impl<B: ProvingBackend> std::fmt::Debug for TileProcessor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileProcessor").field("settings", &self.settings).finish()
    }
}

impl<B: ProvingBackend> TileProcessor<B> {
    pub fn new(prover: Prover<B>, settings: TileSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.workers.max(1)));
        Self {
            prover,
            settings,
            permits,
        }
    }

    pub fn settings(&self) -> TileSettings {
        self.settings
    }

    pub fn prover(&self) -> &Prover<B> {
        &self.prover
    }

    /// Apply `transformation` to `image` and prove it tile by tile.
    ///
    /// # Errors
    ///
    /// - [`TilingError::Input`] for an invalid transformation, too many
    ///   tiles, or a tile circuit over the dimension limit. Nothing is
    ///   compiled.
    /// - [`TilingError::Prover`] for the first tile that fails. Remaining
    ///   tiles are cancelled.
    pub async fn process(
        &self,
        image: &PixelMatrix,
        transformation: Transformation,
        deadline: Deadline,
    ) -> Result<TileOutcome, TilingError> {
        let (output, output_color) = transformation.validate_for(image.dims(), image.color())?;
        let plans = self.plan(image, &transformation, output)?;
        let tile_total = plans.len();
        tracing::info!(%transformation, source = %image.dims(), tiles = tile_total, "processing image");

        let mut posts = Vec::with_capacity(tile_total);
        let mut tasks = JoinSet::new();
        for plan in plans {
            let post = plan.shape.synthesize(&plan.pre)?;
            posts.push(post.clone());
            let prover = self.prover.clone();
            let permits = self.permits.clone();
            let index = plan.tile.index;
            let span = tracing::debug_span!("tile", tile_index = index);
            tasks.spawn(
                async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| TilingError::TaskFailed(e.to_string()))?;
                    let proof = prover
                        .prove(plan.shape, plan.pre, post, deadline)
                        .await
                        .map_err(|source| TilingError::Prover { index, source })?;
                    tracing::debug!(tile_index = index, circuit = %proof.circuit(), "tile proven");
                    Ok::<_, TilingError>((plan.tile, plan.placement, proof))
                }
                .instrument(span),
            );
        }

        let mut proven = Vec::with_capacity(tile_total);
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(TilingError::TaskFailed(e.to_string())),
            };
            match outcome {
                Ok(done) => proven.push(done),
                Err(e) => {
                    tasks.abort_all();
                    tracing::warn!(error = %e, "tile proving failed, remaining tiles cancelled");
                    return Err(e);
                }
            }
        }
        proven.sort_by_key(|(tile, _, _)| tile.index);

        let mut result_image = PixelMatrix::filled(output.width, output.height, output_color, 0);
        let mut tiles = Vec::with_capacity(tile_total);
        for (tile, placement, proof) in proven {
            let (_, result_hash) = proof
                .commitments()
                .map_err(|reason| TilingError::TaskFailed(format!("tile {}: {reason}", tile.index)))?;
            if !placement.is_empty() {
                result_image.blit(&posts[tile.index], placement.x, placement.y)?;
            }
            tiles.push(TileProof {
                tile,
                placement,
                result_hash,
                proof,
            });
        }
        let leaves: Vec<FieldElement> = tiles.iter().map(|t| t.result_hash).collect();
        let root = merkle_root(&leaves)?;
        tracing::info!(%transformation, tiles = tiles.len(), %root, "tile proofs aggregated");

        Ok(TileOutcome {
            result_image,
            set: TileProofSet {
                transformation,
                source: image.dims(),
                output,
                tile_size: self.settings.tile_size,
                root,
                tiles,
            },
        })
    }

    fn plan(
        &self,
        image: &PixelMatrix,
        transformation: &Transformation,
        output: Dimensions,
    ) -> Result<Vec<TilePlan>, InputError> {
        let dims = image.dims();
        let max = self.prover.max_dimension();

        let tile_size = if dims.width <= max && dims.height <= max {
            None
        } else {
            let count = tile_count(dims, self.settings.tile_size);
            if count > self.settings.max_tiles {
                return Err(InputError::TooManyTiles {
                    tiles: count,
                    limit: self.settings.max_tiles,
                });
            }
            Some(self.settings.tile_size)
        };
        layout(transformation, dims, image.color(), output, tile_size)?
            .into_iter()
            .map(|slot| {
                slot.shape.check_limits(max)?;
                Ok(TilePlan {
                    tile: slot.tile,
                    shape: slot.shape,
                    placement: slot.placement,
                    pre: image.region(slot.window)?,
                })
            })
            .collect()
    }
}

/// One tile's circuit, where its result lands in the output, and the
/// source window it witnesses.
#[derive(Debug)]
struct TileSlot {
    tile: Tile,
    shape: CircuitShape,
    placement: Rect,
    window: Rect,
}

fn whole_tile(source: Dimensions) -> Tile {
    Tile {
        index: 0,
        offset_x: 0,
        offset_y: 0,
        width: source.width,
        height: source.height,
    }
}

/// The tiles proving `transformation` of a `source` image. `None` is the
/// bypass layout: one tile, one whole-image circuit.
fn layout(
    transformation: &Transformation,
    source: Dimensions,
    color: ColorSpace,
    output: Dimensions,
    tile_size: Option<u32>,
) -> Result<Vec<TileSlot>, InputError> {
    let Some(tile_size) = tile_size else {
        return Ok(vec![TileSlot {
            tile: whole_tile(source),
            shape: CircuitShape::for_transformation(transformation, source, color)?,
            placement: Rect::full(output),
            window: Rect::full(source),
        }]);
    };
    partition(source, tile_size)?
        .into_iter()
        .map(|tile| tile_circuit(tile, transformation, source, color, output))
        .collect()
}

fn tile_circuit(
    tile: Tile,
    transformation: &Transformation,
    source: Dimensions,
    color: ColorSpace,
    output: Dimensions,
) -> Result<TileSlot, InputError> {
    let bounds = tile.rect();
    let (shape, placement, window) = match *transformation {
        Transformation::Crop { x, y, width, height } => {
            let crop = Rect::new(x, y, width, height);
            let (shape, placement) = match bounds.intersect(&crop) {
                Some(kept) => (
                    CropShape {
                        orig: bounds.dims(),
                        new: kept.dims(),
                        start_x: kept.x - bounds.x,
                        start_y: kept.y - bounds.y,
                        color,
                    },
                    Rect::new(kept.x - crop.x, kept.y - crop.y, kept.width, kept.height),
                ),
                None => (
                    CropShape {
                        orig: bounds.dims(),
                        new: Dimensions::new(0, 0),
                        start_x: 0,
                        start_y: 0,
                        color,
                    },
                    Rect::new(0, 0, 0, 0),
                ),
            };
            let shape = CircuitShape::from_params(TransformKind::Crop, &shape.params())?;
            (shape, placement, bounds)
        }
        Transformation::Resize { .. } => {
            let (ox, owned_w) = owned_outputs(bounds.x, bounds.right(), source.width, output.width);
            let (oy, owned_h) = owned_outputs(bounds.y, bounds.bottom(), source.height, output.height);
            let window = Rect::new(
                bounds.x,
                bounds.y,
                bounds.right().saturating_add(1).min(source.width) - bounds.x,
                bounds.bottom().saturating_add(1).min(source.height) - bounds.y,
            );
            let out = Rect::new(ox, oy, owned_w, owned_h);
            let shape = ResizeShape {
                src: source,
                dst: output,
                window,
                out,
                color,
            };
            let shape = CircuitShape::from_params(TransformKind::Resize, &shape.params())?;
            (shape, out, window)
        }
        Transformation::Grayscale => {
            let shape = GrayscaleShape { dims: bounds.dims() };
            let shape = CircuitShape::from_params(TransformKind::Grayscale, &shape.params())?;
            (shape, bounds, bounds)
        }
    };
    Ok(TileSlot {
        tile,
        shape,
        placement,
        window,
    })
}

/// Output indices along one axis whose lower source tap lies in
/// `[start, end)`, as `(first, count)`. Taps are monotone in the output
/// index, so the owned indices are contiguous.
fn owned_outputs(start: u32, end: u32, src_len: u32, dst_len: u32) -> (u32, u32) {
    let first = (0..dst_len)
        .find(|&o| axis_sample(o, src_len, dst_len).lo >= start)
        .unwrap_or(dst_len);
    let past = (first..dst_len)
        .find(|&o| axis_sample(o, src_len, dst_len).lo >= end)
        .unwrap_or(dst_len);
    (first, past - first)
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Check a tile proof set and return its root.
///
/// Verification keys come from `prover`'s cache and store; nothing is
/// compiled.
pub fn verify_tile_proofs<B: ProvingBackend>(
    set: &TileProofSet,
    prover: &Prover<B>,
) -> Result<FieldElement, TileVerificationError> {
    let Some(first) = set.tiles.first() else {
        return Err(TileVerificationError::Empty);
    };
    let expected_kind = set.transformation.kind();
    for (position, tile) in set.tiles.iter().enumerate() {
        let index = tile.tile.index;
        if index != position {
            return Err(TileVerificationError::IndexNotDense { position, index });
        }
        let found = tile.proof.circuit().kind();
        if found != expected_kind {
            return Err(TileVerificationError::KindMismatch {
                index,
                expected: expected_kind.to_string(),
                found: found.to_string(),
            });
        }
    }

    let invalid = |e: InputError| TileVerificationError::InvalidLayout(e.to_string());
    let circuit = first.proof.circuit();
    let color = CircuitShape::from_params(circuit.kind(), circuit.params())
        .map_err(invalid)?
        .input_color();
    let (output, _) = set.transformation.validate_for(set.source, color).map_err(invalid)?;
    if output != set.output {
        return Err(TileVerificationError::OutputMismatch {
            expected: output,
            found: set.output,
        });
    }

    let bypass = set.tiles.len() == 1 && first.tile == whole_tile(set.source);
    if !bypass {
        let expected = tile_count(set.source, set.tile_size);
        if expected != set.tiles.len() {
            return Err(TileVerificationError::PartitionMismatch {
                expected,
                found: set.tiles.len(),
            });
        }
    }
    let slots = layout(
        &set.transformation,
        set.source,
        color,
        set.output,
        (!bypass).then_some(set.tile_size),
    )
    .map_err(invalid)?;

    for (tile, slot) in set.tiles.iter().zip(&slots) {
        let index = tile.tile.index;
        if tile.tile != slot.tile {
            return Err(TileVerificationError::TileMismatch { index });
        }
        if slot.shape.key().map_err(invalid)? != *tile.proof.circuit() {
            return Err(TileVerificationError::CircuitMismatch { index });
        }
        if tile.placement != slot.placement {
            return Err(TileVerificationError::PlacementMismatch { index });
        }
        let outcome = prover.verify(&tile.proof);
        if !outcome.is_valid() {
            return Err(TileVerificationError::ProofInvalid {
                index,
                diagnostic: outcome.diagnostic.unwrap_or_default(),
            });
        }
        match tile.proof.commitments() {
            Ok((_, committed)) if committed == tile.result_hash => {}
            _ => return Err(TileVerificationError::ResultHashMismatch { index }),
        }
    }
    let leaves: Vec<FieldElement> = set.tiles.iter().map(|t| t.result_hash).collect();
    let root = merkle_root(&leaves).map_err(|e| TileVerificationError::Aggregation(e.to_string()))?;
    if root != set.root {
        return Err(TileVerificationError::RootMismatch);
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{gradient, mock_prover_with_limit};
    use proptest::prelude::*;
    use zkimg_crypto::image_commitment;

    fn processor(root: &std::path::Path, max_dimension: u32, tile_size: u32) -> TileProcessor<zkimg_zkp::mock::MockBackend> {
        TileProcessor::new(
            mock_prover_with_limit(root, max_dimension),
            TileSettings {
                tile_size,
                workers: 3,
                max_tiles: 64,
            },
        )
    }

    #[test]
    fn partition_has_short_last_row_and_column() {
        let tiles = partition(Dimensions::new(10, 7), 4).unwrap();
        assert_eq!(tiles.len(), 6);
        assert_eq!(tiles[2].rect(), Rect::new(8, 0, 2, 4));
        assert_eq!(tiles[5].rect(), Rect::new(8, 4, 2, 3));
        assert_eq!(tile_count(Dimensions::new(10, 7), 4), 6);
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        assert!(matches!(
            partition(Dimensions::new(4, 4), 0),
            Err(InputError::ZeroDimension { what: "tile size" })
        ));
    }

    #[test]
    fn resize_ownership_is_exclusive() {
        // 10 -> 4: taps 0, 3, 6, 9.
        assert_eq!(owned_outputs(0, 4, 10, 4), (0, 2));
        assert_eq!(owned_outputs(4, 8, 10, 4), (2, 1));
        assert_eq!(owned_outputs(8, 10, 10, 4), (3, 1));
        // A tile between taps owns nothing.
        assert_eq!(owned_outputs(4, 5, 10, 4).1, 0);
    }

    proptest! {
        #[test]
        fn partition_covers_every_pixel_once(w in 1u32..80, h in 1u32..80, size in 1u32..32) {
            let dims = Dimensions::new(w, h);
            let tiles = partition(dims, size).unwrap();
            let mut seen = vec![0u8; (w * h) as usize];
            for (i, tile) in tiles.iter().enumerate() {
                prop_assert_eq!(tile.index, i);
                prop_assert!(tile.width >= 1 && tile.width <= size);
                prop_assert!(tile.height >= 1 && tile.height <= size);
                prop_assert!(Rect::full(dims).contains(&tile.rect()));
                for y in tile.offset_y..tile.offset_y + tile.height {
                    for x in tile.offset_x..tile.offset_x + tile.width {
                        seen[(y * w + x) as usize] += 1;
                    }
                }
            }
            prop_assert!(seen.iter().all(|&n| n == 1));
            prop_assert_eq!(tiles.len(), tile_count(dims, size));
        }

        #[test]
        fn resize_outputs_are_owned_once(src in 2u32..60, dst in 1u32..60, size in 1u32..16) {
            let mut covered = 0;
            let mut next = 0;
            for start in (0..src).step_by(size as usize) {
                let (first, count) = owned_outputs(start, (start + size).min(src), src, dst);
                if count > 0 {
                    prop_assert_eq!(first, next);
                    next = first + count;
                }
                covered += count;
            }
            prop_assert_eq!(covered, dst);
        }
    }

    #[tokio::test]
    async fn bypass_matches_single_circuit_commitment() {
        let tmp = tempfile::tempdir().unwrap();
        let p = processor(tmp.path(), 64, 16);
        let image = gradient(20, 12);
        let outcome = p.process(&image, Transformation::Grayscale, Deadline::none()).await.unwrap();
        let expected = Transformation::Grayscale.apply(&image).unwrap();

        assert_eq!(outcome.set.tiles.len(), 1);
        assert_eq!(outcome.set.root, image_commitment(&expected).unwrap());
        assert_eq!(outcome.result_image, expected);
    }

    async fn tiled_round(t: Transformation) {
        let tmp = tempfile::tempdir().unwrap();
        let p = processor(tmp.path(), 16, 8);
        let image = gradient(21, 18);
        let first = p.process(&image, t, Deadline::none()).await.unwrap();
        let second = p.process(&image, t, Deadline::none()).await.unwrap();

        assert_eq!(first.set.tiles.len(), 9);
        assert_eq!(first.result_image, t.apply(&image).unwrap());
        assert_eq!(first.set.root, second.set.root);
        assert_eq!(verify_tile_proofs(&first.set, p.prover()).unwrap(), first.set.root);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tiled_grayscale_assembles_and_verifies() {
        tiled_round(Transformation::Grayscale).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tiled_crop_includes_degenerate_tiles() {
        tiled_round(Transformation::Crop { x: 3, y: 9, width: 10, height: 5 }).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tiled_resize_assembles_and_verifies() {
        tiled_round(Transformation::Resize { width: 13, height: 7 }).await;
    }

    #[tokio::test]
    async fn tile_limit_is_input_error() {
        let tmp = tempfile::tempdir().unwrap();
        let p = TileProcessor::new(
            mock_prover_with_limit(tmp.path(), 16),
            TileSettings {
                tile_size: 4,
                workers: 1,
                max_tiles: 8,
            },
        );
        let err = p
            .process(&gradient(20, 20), Transformation::Grayscale, Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, TilingError::Input(InputError::TooManyTiles { tiles: 25, limit: 8 })));
        assert_eq!(p.prover().cache().compilations(), 0);
    }

    #[tokio::test]
    async fn tampered_sets_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let p = processor(tmp.path(), 16, 8);
        let set = p
            .process(&gradient(17, 9), Transformation::Grayscale, Deadline::none())
            .await
            .unwrap()
            .set;

        let mut wrong_root = set.clone();
        wrong_root.root = FieldElement::from_u64(3);
        assert_eq!(verify_tile_proofs(&wrong_root, p.prover()), Err(TileVerificationError::RootMismatch));

        let mut swapped = set.clone();
        swapped.tiles.swap(0, 1);
        assert_eq!(
            verify_tile_proofs(&swapped, p.prover()),
            Err(TileVerificationError::IndexNotDense { position: 0, index: 1 })
        );

        let mut relabelled = set.clone();
        relabelled.tiles[1].result_hash = set.tiles[0].result_hash;
        assert_eq!(
            verify_tile_proofs(&relabelled, p.prover()),
            Err(TileVerificationError::ResultHashMismatch { index: 1 })
        );

        let mut moved = set.clone();
        moved.tiles[2].placement = set.tiles[1].placement;
        assert_eq!(
            verify_tile_proofs(&moved, p.prover()),
            Err(TileVerificationError::PlacementMismatch { index: 2 })
        );

        let mut wrong_output = set.clone();
        wrong_output.output = Dimensions::new(9, 17);
        assert!(matches!(
            verify_tile_proofs(&wrong_output, p.prover()),
            Err(TileVerificationError::OutputMismatch { .. })
        ));

        let mut empty = set;
        empty.tiles.clear();
        assert_eq!(verify_tile_proofs(&empty, p.prover()), Err(TileVerificationError::Empty));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn relabelled_transformation_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let p = processor(tmp.path(), 16, 8);
        let set = p
            .process(
                &gradient(21, 18),
                Transformation::Crop { x: 3, y: 9, width: 10, height: 5 },
                Deadline::none(),
            )
            .await
            .unwrap()
            .set;
        assert!(verify_tile_proofs(&set, p.prover()).is_ok());

        let mut relabelled = set;
        relabelled.transformation = Transformation::Crop { x: 0, y: 0, width: 2, height: 2 };
        relabelled.output = Dimensions::new(2, 2);
        assert_eq!(
            verify_tile_proofs(&relabelled, p.prover()),
            Err(TileVerificationError::CircuitMismatch { index: 0 })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn truncated_set_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let p = processor(tmp.path(), 16, 8);
        let set = p
            .process(&gradient(21, 18), Transformation::Grayscale, Deadline::none())
            .await
            .unwrap()
            .set;
        assert_eq!(set.tiles.len(), 9);

        let mut truncated = set.clone();
        truncated.tiles.truncate(4);
        let leaves: Vec<FieldElement> = truncated.tiles.iter().map(|t| t.result_hash).collect();
        truncated.root = merkle_root(&leaves).unwrap();
        assert_eq!(
            verify_tile_proofs(&truncated, p.prover()),
            Err(TileVerificationError::PartitionMismatch { expected: 9, found: 4 })
        );

        // A tile size that makes the count match still leaves the tile
        // bounds wrong.
        truncated.tile_size = 16;
        assert_eq!(
            verify_tile_proofs(&truncated, p.prover()),
            Err(TileVerificationError::TileMismatch { index: 0 })
        );

        let mut single = set;
        single.tiles.truncate(1);
        single.root = single.tiles[0].result_hash;
        assert_eq!(
            verify_tile_proofs(&single, p.prover()),
            Err(TileVerificationError::PartitionMismatch { expected: 9, found: 1 })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn heavy_downscale_leaves_tiles_without_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let p = processor(tmp.path(), 16, 8);
        let image = gradient(40, 20);
        let t = Transformation::Resize { width: 3, height: 1 };
        let first = p.process(&image, t, Deadline::none()).await.unwrap();
        let second = p.process(&image, t, Deadline::none()).await.unwrap();

        // Taps land on source columns 0, 19 and 39 of row 0.
        let set = &first.set;
        assert_eq!(set.tiles.len(), 15);
        let owners: Vec<usize> = set
            .tiles
            .iter()
            .filter(|t| !t.placement.is_empty())
            .map(|t| t.tile.index)
            .collect();
        assert_eq!(owners, vec![0, 2, 4]);
        assert_eq!(set.tiles[2].placement, Rect::new(1, 0, 1, 1));
        assert!(set.tiles.iter().all(|t| t.proof.circuit().kind() == TransformKind::Resize));

        assert_eq!(first.result_image, t.apply(&image).unwrap());
        assert_eq!(first.set, second.set);
        assert_eq!(verify_tile_proofs(set, p.prover()).unwrap(), set.root);
    }
}

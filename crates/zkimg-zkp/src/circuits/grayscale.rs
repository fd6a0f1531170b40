//! Grayscale circuit: `30R + 59G + 11B == 100*gray - neg_rem + pos_rem`
//! per pixel, with `pos_rem <= 49`, `neg_rem <= 50` and at most one of
//! them non-zero. Exactly one `gray` satisfies this for every pixel.

use zkimg_core::arith::{luminance_numerator, RoundingSplit, GRAY_SCALE};
use zkimg_core::params::names::*;
use zkimg_core::transform::grayscale;
use zkimg_core::{CircuitParams, ColorSpace, Deadline, Dimensions, InputError, PixelMatrix, TransformKind};

use super::{commitment_constraints, AuxValues};
use crate::error::ProofGenerationError;

/// One equality plus two 6-bit range checks and the exclusivity product.
const CONSTRAINTS_PER_PIXEL: u64 = 1 + 2 * 6 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrayscaleShape {
    pub dims: Dimensions,
}

impl GrayscaleShape {
    pub fn from_params(params: &CircuitParams) -> Result<Self, InputError> {
        let kind = TransformKind::Grayscale;
        let dims = Dimensions::new(params.require(kind, ORIG_WIDTH)?, params.require(kind, ORIG_HEIGHT)?);
        if dims.is_empty() {
            return Err(InputError::InvalidParameters {
                kind: kind.to_string(),
                reason: format!("image {dims} is empty"),
            });
        }
        Ok(Self { dims })
    }

    pub fn params(&self) -> CircuitParams {
        CircuitParams::new()
            .with(ORIG_WIDTH, self.dims.width)
            .with(ORIG_HEIGHT, self.dims.height)
    }

    pub fn estimated_constraints(&self) -> u64 {
        self.dims.pixel_count() as u64 * CONSTRAINTS_PER_PIXEL
            + commitment_constraints(self.dims, ColorSpace::Rgb)
            + commitment_constraints(self.dims, ColorSpace::Gray)
    }

    pub fn synthesize(&self, pre: &PixelMatrix) -> Result<PixelMatrix, InputError> {
        grayscale(pre)
    }

    pub fn prepare_aux(&self, pre: &PixelMatrix, post: &PixelMatrix) -> AuxValues {
        let mut aux = AuxValues::with_capacity(self.dims.pixel_count());
        for y in 0..self.dims.height {
            for x in 0..self.dims.width {
                let p = pre.pixel(x, y);
                let numerator = luminance_numerator(p[0], p[1], p[2]);
                aux.push(RoundingSplit::against(
                    numerator,
                    GRAY_SCALE,
                    u64::from(post.sample(x, y, 0)),
                ));
            }
        }
        aux
    }

    pub fn check(
        &self,
        pre: &PixelMatrix,
        post: &PixelMatrix,
        aux: &AuxValues,
        deadline: Deadline,
    ) -> Result<(), ProofGenerationError> {
        let violation = |constraint, x, y| ProofGenerationError::UnsatisfiedConstraint {
            circuit: "grayscale",
            constraint,
            x,
            y,
            channel: 0,
        };
        if aux.len() != self.dims.pixel_count() {
            return Err(violation("remainder witness", 0, 0));
        }
        let mut index = 0usize;
        for y in 0..self.dims.height {
            if deadline.expired() {
                return Err(ProofGenerationError::Timeout);
            }
            for x in 0..self.dims.width {
                let (pos_rem, neg_rem) = aux.get(index).ok_or_else(|| violation("remainder witness", x, y))?;
                index += 1;
                let p = pre.pixel(x, y);
                let split = RoundingSplit {
                    quotient: u64::from(post.sample(x, y, 0)),
                    pos_rem,
                    neg_rem,
                };
                if !split.is_valid(luminance_numerator(p[0], p[1], p[2]), GRAY_SCALE) {
                    return Err(violation("rounding", x, y));
                }
            }
        }
        Ok(())
    }
}

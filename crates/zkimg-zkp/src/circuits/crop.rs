//! Crop circuit: every result sample equals the source sample at the same
//! position shifted by `(start_y, start_x)`. Channel-wise equality, no
//! tolerance. A zero-sized result is a valid (degenerate) crop, used for
//! tiles that miss the crop rectangle entirely.

use zkimg_core::params::names::*;
use zkimg_core::{CircuitParams, ColorSpace, Deadline, Dimensions, InputError, PixelMatrix, Rect, TransformKind};

use super::commitment_constraints;
use crate::error::ProofGenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropShape {
    pub orig: Dimensions,
    pub new: Dimensions,
    pub start_x: u32,
    pub start_y: u32,
    pub color: ColorSpace,
}

impl CropShape {
    pub fn from_params(params: &CircuitParams) -> Result<Self, InputError> {
        let kind = TransformKind::Crop;
        let orig = Dimensions::new(params.require(kind, ORIG_WIDTH)?, params.require(kind, ORIG_HEIGHT)?);
        let new = Dimensions::new(params.require(kind, NEW_WIDTH)?, params.require(kind, NEW_HEIGHT)?);
        let start_x = params.require(kind, START_X)?;
        let start_y = params.require(kind, START_Y)?;
        let channels = params.require(kind, CHANNELS)?;

        let invalid = |reason: String| InputError::InvalidParameters {
            kind: kind.to_string(),
            reason,
        };
        let color = ColorSpace::from_channels(channels)
            .ok_or_else(|| invalid(format!("channels must be 1 or 3, got {channels}")))?;
        if orig.is_empty() {
            return Err(invalid(format!("source {orig} is empty")));
        }
        let shape = Self {
            orig,
            new,
            start_x,
            start_y,
            color,
        };
        let fits = start_x.checked_add(new.width).is_some()
            && start_y.checked_add(new.height).is_some()
            && Rect::full(orig).contains(&shape.region());
        if !fits {
            return Err(InputError::CropOutOfBounds {
                x: start_x,
                y: start_y,
                width: new.width,
                height: new.height,
                source_width: orig.width,
                source_height: orig.height,
            });
        }
        Ok(shape)
    }

    pub fn params(&self) -> CircuitParams {
        CircuitParams::new()
            .with(ORIG_WIDTH, self.orig.width)
            .with(ORIG_HEIGHT, self.orig.height)
            .with(NEW_WIDTH, self.new.width)
            .with(NEW_HEIGHT, self.new.height)
            .with(START_X, self.start_x)
            .with(START_Y, self.start_y)
            .with(CHANNELS, self.color.channels())
    }

    /// The kept rectangle in source coordinates.
    pub fn region(&self) -> Rect {
        Rect::new(self.start_x, self.start_y, self.new.width, self.new.height)
    }

    pub fn estimated_constraints(&self) -> u64 {
        let channels = u64::from(self.color.channels());
        self.new.pixel_count() as u64 * channels
            + commitment_constraints(self.orig, self.color)
            + commitment_constraints(self.new, self.color)
    }

    pub fn synthesize(&self, pre: &PixelMatrix) -> Result<PixelMatrix, InputError> {
        pre.region(self.region())
    }

    pub fn check(&self, pre: &PixelMatrix, post: &PixelMatrix, deadline: Deadline) -> Result<(), ProofGenerationError> {
        let channels = self.color.channels();
        for y in 0..self.new.height {
            if deadline.expired() {
                return Err(ProofGenerationError::Timeout);
            }
            for x in 0..self.new.width {
                for c in 0..channels {
                    if post.sample(x, y, c) != pre.sample(x + self.start_x, y + self.start_y, c) {
                        return Err(ProofGenerationError::UnsatisfiedConstraint {
                            circuit: "crop",
                            constraint: "equality",
                            x,
                            y,
                            channel: c,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

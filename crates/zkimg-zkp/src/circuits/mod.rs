//! # Circuit Definitions
//!
//! One circuit family per [`TransformKind`]. A [`CircuitShape`] is the fully
//! resolved geometry of one circuit instance: it is what a
//! [`CircuitKey`] names, what a backend compiles, and what a witness must
//! match.
//!
//! ## Constraint evaluation
//!
//! [`CircuitShape::check`] evaluates exactly the constraints the compiled
//! circuit enforces, against a concrete witness. The mock backend proves by
//! running it; the snarkjs backend runs it before invoking the prover so
//! that an unsatisfiable witness fails with a pixel position instead of an
//! opaque witness-generation error.
//!
//! ## Auxiliary witness values
//!
//! Resize and grayscale need rounding remainders ([`AuxValues`]). They are
//! derived from the pre-image and the *claimed* post-image, so a wrong
//! post-image yields remainders that violate their range bounds.

mod crop;
mod grayscale;
mod resize;

pub use crop::CropShape;
pub use grayscale::GrayscaleShape;
pub use resize::ResizeShape;

use zeroize::{Zeroize, ZeroizeOnDrop};
use zkimg_core::arith::RoundingSplit;
use zkimg_core::params::dimension_params;
use zkimg_core::{
    CircuitKey, CircuitParams, ColorSpace, Deadline, Dimensions, InputError, PixelMatrix,
    TransformKind, Transformation,
};
use zkimg_crypto::poseidon::{ABSORB_RATE, BYTES_PER_ELEMENT};

use crate::error::ProofGenerationError;

/// Rough R1CS cost of one Poseidon permutation (width up to 13, BN254).
const POSEIDON_PERMUTATION_CONSTRAINTS: u64 = 240;

/// Estimated constraints for committing to a `dims` image: byte packing plus
/// one permutation per absorbed block and one for the header.
pub(crate) fn commitment_constraints(dims: Dimensions, color: ColorSpace) -> u64 {
    let bytes = dims.pixel_count() as u64 * u64::from(color.channels());
    let elements = bytes.div_ceil(BYTES_PER_ELEMENT as u64);
    let permutations = elements.div_ceil(ABSORB_RATE as u64) + 1;
    POSEIDON_PERMUTATION_CONSTRAINTS * permutations + elements
}

// ---------------------------------------------------------------------------
// CircuitShape
// ---------------------------------------------------------------------------

/// Resolved geometry of one circuit instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitShape {
    Crop(CropShape),
    Resize(ResizeShape),
    Grayscale(GrayscaleShape),
}

impl CircuitShape {
    /// Resolve a shape from raw parameters. Fails on the first missing
    /// parameter or on geometry the circuit cannot express (crop outside
    /// the source, resize window missing taps).
    pub fn from_params(kind: TransformKind, params: &CircuitParams) -> Result<Self, InputError> {
        params.check_required(kind)?;
        Ok(match kind {
            TransformKind::Crop => Self::Crop(CropShape::from_params(params)?),
            TransformKind::Resize => Self::Resize(ResizeShape::from_params(params)?),
            TransformKind::Grayscale => Self::Grayscale(GrayscaleShape::from_params(params)?),
        })
    }

    /// The whole-image circuit for applying `t` to a `dims` image.
    pub fn for_transformation(
        t: &Transformation,
        dims: Dimensions,
        color: ColorSpace,
    ) -> Result<Self, InputError> {
        let (out_dims, _) = t.validate_for(dims, color)?;
        Ok(match *t {
            Transformation::Crop { x, y, .. } => Self::Crop(CropShape {
                orig: dims,
                new: out_dims,
                start_x: x,
                start_y: y,
                color,
            }),
            Transformation::Resize { .. } => Self::Resize(ResizeShape::whole(dims, out_dims, color)),
            Transformation::Grayscale => Self::Grayscale(GrayscaleShape { dims }),
        })
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Self::Crop(_) => TransformKind::Crop,
            Self::Resize(_) => TransformKind::Resize,
            Self::Grayscale(_) => TransformKind::Grayscale,
        }
    }

    pub fn params(&self) -> CircuitParams {
        match self {
            Self::Crop(s) => s.params(),
            Self::Resize(s) => s.params(),
            Self::Grayscale(s) => s.params(),
        }
    }

    pub fn key(&self) -> Result<CircuitKey, InputError> {
        CircuitKey::derive(self.kind(), &self.params())
    }

    pub fn input_dims(&self) -> Dimensions {
        match self {
            Self::Crop(s) => s.orig,
            Self::Resize(s) => s.window.dims(),
            Self::Grayscale(s) => s.dims,
        }
    }

    pub fn input_color(&self) -> ColorSpace {
        match self {
            Self::Crop(s) => s.color,
            Self::Resize(s) => s.color,
            Self::Grayscale(_) => ColorSpace::Rgb,
        }
    }

    pub fn output_dims(&self) -> Dimensions {
        match self {
            Self::Crop(s) => s.new,
            Self::Resize(s) => s.out.dims(),
            Self::Grayscale(s) => s.dims,
        }
    }

    pub fn output_color(&self) -> ColorSpace {
        match self {
            Self::Crop(s) => s.color,
            Self::Resize(s) => s.color,
            Self::Grayscale(_) => ColorSpace::Gray,
        }
    }

    /// Reject shapes whose witnessed dimensions exceed `max_dimension`.
    pub fn check_limits(&self, max_dimension: u32) -> Result<(), InputError> {
        let params = self.params();
        for name in dimension_params(self.kind()) {
            let value = params.require(self.kind(), name)?;
            if value > max_dimension {
                return Err(InputError::DimensionLimitExceeded {
                    bound: (*name).to_string(),
                    value,
                    limit: max_dimension,
                });
            }
        }
        Ok(())
    }

    pub fn estimated_constraints(&self) -> u64 {
        match self {
            Self::Crop(s) => s.estimated_constraints(),
            Self::Resize(s) => s.estimated_constraints(),
            Self::Grayscale(s) => s.estimated_constraints(),
        }
    }

    /// Compute the post-image this circuit accepts for `pre`.
    pub fn synthesize(&self, pre: &PixelMatrix) -> Result<PixelMatrix, InputError> {
        self.ensure_input(pre)?;
        match self {
            Self::Crop(s) => s.synthesize(pre),
            Self::Resize(s) => s.synthesize(pre),
            Self::Grayscale(s) => s.synthesize(pre),
        }
    }

    fn ensure_input(&self, pre: &PixelMatrix) -> Result<(), InputError> {
        let expected = (self.input_dims(), self.input_color());
        if (pre.dims(), pre.color()) != expected {
            return Err(InputError::OutputShapeMismatch {
                expected: format!("{} {}", expected.0, expected.1.as_str()),
                actual: pre.describe(),
            });
        }
        Ok(())
    }

    /// Remainder witnesses for `(pre, post)`. Empty for crop.
    pub fn prepare_aux(&self, pre: &PixelMatrix, post: &PixelMatrix) -> AuxValues {
        match self {
            Self::Crop(_) => AuxValues::default(),
            Self::Resize(s) => s.prepare_aux(pre, post),
            Self::Grayscale(s) => s.prepare_aux(pre, post),
        }
    }

    /// Evaluate every circuit constraint. Shapes of `pre` and `post` must
    /// already match [`input_dims`](Self::input_dims) and
    /// [`output_dims`](Self::output_dims).
    pub fn check(
        &self,
        pre: &PixelMatrix,
        post: &PixelMatrix,
        aux: &AuxValues,
        deadline: Deadline,
    ) -> Result<(), ProofGenerationError> {
        match self {
            Self::Crop(s) => s.check(pre, post, deadline),
            Self::Resize(s) => s.check(pre, post, aux, deadline),
            Self::Grayscale(s) => s.check(pre, post, aux, deadline),
        }
    }
}

// ---------------------------------------------------------------------------
// AuxValues
// ---------------------------------------------------------------------------

/// Per-sample rounding remainders, in circuit order. Zeroized on drop: the
/// remainders leak low-order bits of the private pre-image.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AuxValues {
    pos_rem: Vec<u64>,
    neg_rem: Vec<u64>,
}

impl AuxValues {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            pos_rem: Vec::with_capacity(n),
            neg_rem: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, split: RoundingSplit) {
        self.pos_rem.push(split.pos_rem);
        self.neg_rem.push(split.neg_rem);
    }

    /// `(pos_rem, neg_rem)` of sample `index`.
    pub fn get(&self, index: usize) -> Option<(u64, u64)> {
        Some((*self.pos_rem.get(index)?, *self.neg_rem.get(index)?))
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, index: usize, pos_rem: u64, neg_rem: u64) {
        self.pos_rem[index] = pos_rem;
        self.neg_rem[index] = neg_rem;
    }

    pub fn len(&self) -> usize {
        self.pos_rem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos_rem.is_empty()
    }

    pub fn pos_rem(&self) -> &[u64] {
        &self.pos_rem
    }

    pub fn neg_rem(&self) -> &[u64] {
        &self.neg_rem
    }
}

impl std::fmt::Debug for AuxValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxValues")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_shape_from_transformation_matches_params() {
        let t = Transformation::Crop {
            x: 256,
            y: 256,
            width: 512,
            height: 512,
        };
        let shape = CircuitShape::for_transformation(&t, Dimensions::new(1024, 1024), ColorSpace::Rgb).unwrap();
        let again = CircuitShape::from_params(TransformKind::Crop, &shape.params()).unwrap();
        assert_eq!(shape, again);
        assert_eq!(shape.output_dims(), Dimensions::new(512, 512));
        assert_eq!(
            shape.key().unwrap().to_string(),
            "crop/channels-3_new_height-512_new_width-512_orig_height-1024_orig_width-1024_start_x-256_start_y-256"
        );
    }

    #[test]
    fn missing_parameter_is_named() {
        let params = CircuitParams::new().with("orig_width", 10);
        let err = CircuitShape::from_params(TransformKind::Grayscale, &params).unwrap_err();
        assert!(matches!(err, InputError::MissingParameter { name: "orig_height", .. }));
    }

    #[test]
    fn limits_apply_to_witnessed_dimensions() {
        let t = Transformation::Resize {
            width: 128,
            height: 128,
        };
        let shape = CircuitShape::for_transformation(&t, Dimensions::new(2048, 64), ColorSpace::Rgb).unwrap();
        let err = shape.check_limits(1024).unwrap_err();
        assert!(matches!(
            err,
            InputError::DimensionLimitExceeded { ref bound, value: 2048, limit: 1024 } if bound == "orig_width"
        ));
        assert!(shape.check_limits(2048).is_ok());
    }

    #[test]
    fn grayscale_needs_rgb_input() {
        let err = CircuitShape::for_transformation(
            &Transformation::Grayscale,
            Dimensions::new(4, 4),
            ColorSpace::Gray,
        )
        .unwrap_err();
        assert!(matches!(err, InputError::UnsupportedColor { .. }));
    }

    #[test]
    fn synthesize_rejects_wrong_input_shape() {
        let shape = CircuitShape::Grayscale(GrayscaleShape {
            dims: Dimensions::new(4, 4),
        });
        let pre = PixelMatrix::filled(4, 5, ColorSpace::Rgb, 0);
        assert!(matches!(
            shape.synthesize(&pre),
            Err(InputError::OutputShapeMismatch { .. })
        ));
    }

    #[test]
    fn commitment_cost_grows_with_image() {
        let small = commitment_constraints(Dimensions::new(8, 8), ColorSpace::Gray);
        let large = commitment_constraints(Dimensions::new(64, 64), ColorSpace::Rgb);
        assert!(large > small);
        assert_eq!(
            commitment_constraints(Dimensions::new(0, 0), ColorSpace::Rgb),
            POSEIDON_PERMUTATION_CONSTRAINTS
        );
    }

    #[test]
    fn aux_debug_is_redacted() {
        let mut aux = AuxValues::default();
        aux.push(RoundingSplit {
            quotient: 7,
            pos_rem: 12,
            neg_rem: 0,
        });
        let shown = format!("{aux:?}");
        assert!(shown.contains("len: 1"));
        assert!(!shown.contains("12"));
    }
}

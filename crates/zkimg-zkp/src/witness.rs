//! # Witness Assembly
//!
//! A [`Witness`] holds the private pre- and post-images, the auxiliary
//! rounding remainders and the two public image commitments for one proof.
//!
//! ## Security Invariant
//!
//! Pixel data and remainders are private inputs. `Witness` is neither
//! `Serialize` nor `Clone`, its `Debug` output is redacted, and every
//! buffer it owns is zeroized on drop. Only the commitments are ever
//! exposed, via [`Witness::public_signals`].

use std::fmt;

use zkimg_core::PixelMatrix;
use zkimg_crypto::{image_commitment, FieldElement};

use crate::circuits::{AuxValues, CircuitShape};
use crate::engine::PublicSignals;
use crate::error::ProofGenerationError;

/// Private inputs plus public commitments for one circuit instance.
pub struct Witness {
    shape: CircuitShape,
    pre: PixelMatrix,
    post: PixelMatrix,
    aux: AuxValues,
    input_hash: FieldElement,
    output_hash: FieldElement,
}

impl Witness {
    /// Assemble a witness for `shape`.
    ///
    /// Checks that both images have the dimensions and colour space the
    /// shape declares, derives the remainder witnesses and computes both
    /// Poseidon commitments. Constraint satisfaction is *not* checked here:
    /// a witness for a wrong post-image can be built, it just cannot be
    /// proven.
    pub fn prepare(
        shape: CircuitShape,
        pre: PixelMatrix,
        post: PixelMatrix,
    ) -> Result<Self, ProofGenerationError> {
        check_side("pre-image", &pre, shape.input_dims(), shape.input_color())?;
        check_side("post-image", &post, shape.output_dims(), shape.output_color())?;

        let aux = shape.prepare_aux(&pre, &post);
        let input_hash =
            image_commitment(&pre).map_err(|e| ProofGenerationError::Commitment(e.to_string()))?;
        let output_hash =
            image_commitment(&post).map_err(|e| ProofGenerationError::Commitment(e.to_string()))?;
        Ok(Self {
            shape,
            pre,
            post,
            aux,
            input_hash,
            output_hash,
        })
    }

    pub fn shape(&self) -> &CircuitShape {
        &self.shape
    }

    pub fn pre(&self) -> &PixelMatrix {
        &self.pre
    }

    pub fn post(&self) -> &PixelMatrix {
        &self.post
    }

    pub fn aux(&self) -> &AuxValues {
        &self.aux
    }

    /// Commitment to the pre-image.
    pub fn input_hash(&self) -> FieldElement {
        self.input_hash
    }

    /// Commitment to the post-image.
    pub fn output_hash(&self) -> FieldElement {
        self.output_hash
    }

    /// `[input_hash, output_hash]` in decimal, the order the circuits
    /// declare their public outputs.
    pub fn public_signals(&self) -> PublicSignals {
        PublicSignals::from_commitments(&self.input_hash, &self.output_hash)
    }
}

fn check_side(
    side: &'static str,
    image: &PixelMatrix,
    dims: zkimg_core::Dimensions,
    color: zkimg_core::ColorSpace,
) -> Result<(), ProofGenerationError> {
    if image.dims() != dims || image.color() != color {
        return Err(ProofGenerationError::WitnessShapeMismatch {
            side,
            expected: format!("{dims} {}", color.as_str()),
            actual: image.describe(),
        });
    }
    Ok(())
}

impl fmt::Debug for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Witness")
            .field("shape", &self.shape)
            .field("pre", &"[REDACTED]")
            .field("post", &"[REDACTED]")
            .field("input_hash", &self.input_hash)
            .field("output_hash", &self.output_hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkimg_core::{ColorSpace, Dimensions, Transformation};

    fn crop_shape() -> CircuitShape {
        CircuitShape::for_transformation(
            &Transformation::Crop {
                x: 1,
                y: 1,
                width: 2,
                height: 2,
            },
            Dimensions::new(4, 4),
            ColorSpace::Rgb,
        )
        .unwrap()
    }

    #[test]
    fn commitments_match_the_images() {
        let pre = PixelMatrix::from_fn(4, 4, ColorSpace::Rgb, |x, y, c| (x + y + c) as u8);
        let post = crop_shape().synthesize(&pre).unwrap();
        let expected_in = image_commitment(&pre).unwrap();
        let expected_out = image_commitment(&post).unwrap();
        let w = Witness::prepare(crop_shape(), pre, post).unwrap();
        assert_eq!(w.input_hash(), expected_in);
        assert_eq!(w.output_hash(), expected_out);
        let (i, o) = w.public_signals().parse().unwrap();
        assert_eq!((i, o), (expected_in, expected_out));
    }

    #[test]
    fn wrong_post_shape_names_the_side() {
        let pre = PixelMatrix::filled(4, 4, ColorSpace::Rgb, 1);
        let post = PixelMatrix::filled(3, 2, ColorSpace::Rgb, 1);
        let err = Witness::prepare(crop_shape(), pre, post).unwrap_err();
        assert!(matches!(
            err,
            ProofGenerationError::WitnessShapeMismatch { side: "post-image", .. }
        ));
    }

    #[test]
    fn wrong_pre_colour_is_rejected() {
        let pre = PixelMatrix::filled(4, 4, ColorSpace::Gray, 1);
        let post = PixelMatrix::filled(2, 2, ColorSpace::Rgb, 1);
        let err = Witness::prepare(crop_shape(), pre, post).unwrap_err();
        assert!(matches!(
            err,
            ProofGenerationError::WitnessShapeMismatch { side: "pre-image", .. }
        ));
    }

    #[test]
    fn debug_output_hides_pixels() {
        let pre = PixelMatrix::filled(4, 4, ColorSpace::Rgb, 201);
        let post = PixelMatrix::filled(2, 2, ColorSpace::Rgb, 201);
        let w = Witness::prepare(crop_shape(), pre, post).unwrap();
        let shown = format!("{w:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("201, 201"));
    }
}

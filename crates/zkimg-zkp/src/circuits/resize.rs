//! Resize circuit: align-corners bilinear resampling in scaled integers.
//!
//! A resize circuit covers an output region `out` of the full `dst` image,
//! witnessed against a source `window` of the full `src` image. A whole
//! image resize is the special case `window = src`, `out = dst`; tiles use
//! smaller windows. Per output sample the circuit enforces
//!
//! ```text
//! weighted_sum(p00, p01, p10, p11) == dx*dy * result - neg_rem + pos_rem
//! ```
//!
//! with the remainder bounds from [`zkimg_core::arith`].

use std::convert::Infallible;

use zkimg_core::arith::{BilinearTap, RoundingSplit};
use zkimg_core::params::names::*;
use zkimg_core::transform::resize_window;
use zkimg_core::{
    CircuitParams, ColorSpace, Deadline, Dimensions, InputError, PixelMatrix, Rect, TransformKind,
};

use super::{commitment_constraints, AuxValues};
use crate::error::ProofGenerationError;

/// Range-check cost of one remainder pair.
const REMAINDER_BITS: u64 = 2 * 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResizeShape {
    /// Full source extent.
    pub src: Dimensions,
    /// Full target extent.
    pub dst: Dimensions,
    /// Witnessed source window, in source coordinates.
    pub window: Rect,
    /// Produced output region, in target coordinates.
    pub out: Rect,
    pub color: ColorSpace,
}

impl ResizeShape {
    /// Whole-image resize.
    pub fn whole(src: Dimensions, dst: Dimensions, color: ColorSpace) -> Self {
        Self {
            src,
            dst,
            window: Rect::full(src),
            out: Rect::full(dst),
            color,
        }
    }

    pub fn from_params(params: &CircuitParams) -> Result<Self, InputError> {
        let kind = TransformKind::Resize;
        let get = |name: &'static str| params.require(kind, name);
        let orig = Dimensions::new(get(ORIG_WIDTH)?, get(ORIG_HEIGHT)?);
        let new = Dimensions::new(get(NEW_WIDTH)?, get(NEW_HEIGHT)?);
        let channels = get(CHANNELS)?;
        let src = Dimensions::new(get(SRC_WIDTH)?, get(SRC_HEIGHT)?);
        let dst = Dimensions::new(get(DST_WIDTH)?, get(DST_HEIGHT)?);
        let window = Rect::new(get(WINDOW_X)?, get(WINDOW_Y)?, orig.width, orig.height);
        let out = Rect::new(get(OUT_X)?, get(OUT_Y)?, new.width, new.height);

        let invalid = |reason: String| InputError::InvalidParameters {
            kind: kind.to_string(),
            reason,
        };
        let color = ColorSpace::from_channels(channels)
            .ok_or_else(|| invalid(format!("channels must be 1 or 3, got {channels}")))?;
        if src.is_empty() || dst.is_empty() {
            return Err(invalid(format!("cannot resize {src} to {dst}")));
        }
        if window.is_empty() || !Rect::full(src).contains(&window) {
            return Err(invalid(format!("window {window:?} not inside source {src}")));
        }
        if !Rect::full(dst).contains(&out) {
            return Err(invalid(format!("output region {out:?} not inside target {dst}")));
        }
        let shape = Self {
            src,
            dst,
            window,
            out,
            color,
        };
        if !shape.window_covers_taps() {
            return Err(invalid(format!(
                "window {window:?} does not contain every tap of output region {out:?}"
            )));
        }
        Ok(shape)
    }

    /// Taps are monotone in the output index, so the first and last output
    /// pixels bound every tap the region reads.
    fn window_covers_taps(&self) -> bool {
        if self.out.is_empty() {
            return true;
        }
        let first = BilinearTap::at(self.out.x, self.out.y, self.src, self.dst);
        let last = BilinearTap::at(self.out.right() - 1, self.out.bottom() - 1, self.src, self.dst);
        let needed = Rect::new(
            first.x.lo,
            first.y.lo,
            last.x.hi - first.x.lo + 1,
            last.y.hi - first.y.lo + 1,
        );
        self.window.contains(&needed)
    }

    pub fn params(&self) -> CircuitParams {
        CircuitParams::new()
            .with(ORIG_WIDTH, self.window.width)
            .with(ORIG_HEIGHT, self.window.height)
            .with(NEW_WIDTH, self.out.width)
            .with(NEW_HEIGHT, self.out.height)
            .with(CHANNELS, self.color.channels())
            .with(SRC_WIDTH, self.src.width)
            .with(SRC_HEIGHT, self.src.height)
            .with(DST_WIDTH, self.dst.width)
            .with(DST_HEIGHT, self.dst.height)
            .with(WINDOW_X, self.window.x)
            .with(WINDOW_Y, self.window.y)
            .with(OUT_X, self.out.x)
            .with(OUT_Y, self.out.y)
    }

    pub fn estimated_constraints(&self) -> u64 {
        let samples = self.out.dims().pixel_count() as u64 * u64::from(self.color.channels());
        samples * (1 + REMAINDER_BITS)
            + commitment_constraints(self.window.dims(), self.color)
            + commitment_constraints(self.out.dims(), self.color)
    }

    pub fn synthesize(&self, pre: &PixelMatrix) -> Result<PixelMatrix, InputError> {
        resize_window(pre, (self.window.x, self.window.y), self.src, self.dst, self.out)
    }

    /// Calls `f(local_x, local_y, channel, weighted_sum, denominator)` for
    /// every output sample in row-major, channel-interleaved order,
    /// stopping at the first error.
    fn try_for_each_sample<E>(
        &self,
        pre: &PixelMatrix,
        mut f: impl FnMut(u32, u32, u32, u64, u64) -> Result<(), E>,
    ) -> Result<(), E> {
        let channels = self.color.channels();
        for oy in self.out.y..self.out.bottom() {
            for ox in self.out.x..self.out.right() {
                let tap = BilinearTap::at(ox, oy, self.src, self.dst);
                let (x0, x1) = (tap.x.lo - self.window.x, tap.x.hi - self.window.x);
                let (y0, y1) = (tap.y.lo - self.window.y, tap.y.hi - self.window.y);
                for c in 0..channels {
                    let sum = tap.weighted_sum(
                        pre.sample(x0, y0, c),
                        pre.sample(x1, y0, c),
                        pre.sample(x0, y1, c),
                        pre.sample(x1, y1, c),
                    );
                    f(ox - self.out.x, oy - self.out.y, c, sum, tap.denominator())?;
                }
            }
        }
        Ok(())
    }

    pub fn prepare_aux(&self, pre: &PixelMatrix, post: &PixelMatrix) -> AuxValues {
        let samples = self.out.dims().pixel_count() * self.color.channels() as usize;
        let mut aux = AuxValues::with_capacity(samples);
        let visited = self.try_for_each_sample::<Infallible>(pre, |x, y, c, sum, denom| {
            aux.push(RoundingSplit::against(sum, denom, u64::from(post.sample(x, y, c))));
            Ok(())
        });
        if let Err(never) = visited {
            match never {}
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
        let mut index = 0usize;
        self.try_for_each_sample(pre, |x, y, c, sum, denom| {
            if x == 0 && c == 0 && deadline.expired() {
                return Err(ProofGenerationError::Timeout);
            }
            let violation = |constraint| ProofGenerationError::UnsatisfiedConstraint {
                circuit: "resize",
                constraint,
                x,
                y,
                channel: c,
            };
            let (pos_rem, neg_rem) = aux.get(index).ok_or_else(|| violation("remainder witness"))?;
            index += 1;
            let split = RoundingSplit {
                quotient: u64::from(post.sample(x, y, c)),
                pos_rem,
                neg_rem,
            };
            if split.is_valid(sum, denom) {
                Ok(())
            } else {
                Err(violation("bilinear rounding"))
            }
        })?;
        if index != aux.len() {
            return Err(ProofGenerationError::UnsatisfiedConstraint {
                circuit: "resize",
                constraint: "remainder witness",
                x: 0,
                y: 0,
                channel: 0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn image(w: u32, h: u32) -> PixelMatrix {
        PixelMatrix::from_fn(w, h, ColorSpace::Rgb, |x, y, c| ((x * 37 + y * 11 + c * 5) % 256) as u8)
    }

    #[test]
    fn whole_resize_round_trips_params() {
        let s = ResizeShape::whole(Dimensions::new(64, 48), Dimensions::new(16, 12), ColorSpace::Rgb);
        assert_eq!(ResizeShape::from_params(&s.params()).unwrap(), s);
    }

    #[test]
    fn window_missing_taps_is_invalid() {
        let mut s = ResizeShape::whole(Dimensions::new(64, 48), Dimensions::new(16, 12), ColorSpace::Rgb);
        s.window = Rect::new(0, 0, 32, 48);
        assert!(matches!(
            ResizeShape::from_params(&s.params()),
            Err(InputError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn reference_output_satisfies_constraints() {
        let s = ResizeShape::whole(Dimensions::new(23, 17), Dimensions::new(9, 30), ColorSpace::Rgb);
        let pre = image(23, 17);
        let post = s.synthesize(&pre).unwrap();
        let aux = s.prepare_aux(&pre, &post);
        assert_eq!(aux.len(), 9 * 30 * 3);
        s.check(&pre, &post, &aux, Deadline::none()).unwrap();
    }

    #[test]
    fn off_by_one_result_is_caught() {
        let s = ResizeShape::whole(Dimensions::new(10, 10), Dimensions::new(4, 4), ColorSpace::Rgb);
        let pre = image(10, 10);
        let mut post = s.synthesize(&pre).unwrap();
        let v = post.sample(1, 2, 0);
        post.set_sample(1, 2, 0, v.wrapping_add(1));
        let aux = s.prepare_aux(&pre, &post);
        let err = s.check(&pre, &post, &aux, Deadline::none()).unwrap_err();
        assert!(matches!(
            err,
            ProofGenerationError::UnsatisfiedConstraint { x: 1, y: 2, channel: 0, .. }
        ));
    }

    #[test]
    fn truncated_aux_is_caught() {
        let s = ResizeShape::whole(Dimensions::new(6, 6), Dimensions::new(3, 3), ColorSpace::Gray);
        let pre = PixelMatrix::filled(6, 6, ColorSpace::Gray, 9);
        let post = s.synthesize(&pre).unwrap();
        let aux = AuxValues::default();
        assert!(s.check(&pre, &post, &aux, Deadline::none()).is_err());
    }

    #[test]
    fn expired_deadline_stops_check() {
        let s = ResizeShape::whole(Dimensions::new(12, 8), Dimensions::new(5, 4), ColorSpace::Gray);
        let pre = PixelMatrix::filled(12, 8, ColorSpace::Gray, 40);
        let post = s.synthesize(&pre).unwrap();
        let aux = s.prepare_aux(&pre, &post);
        assert_eq!(aux.len(), 5 * 4);
        let expired = Deadline::at(std::time::Instant::now());
        assert!(matches!(
            s.check(&pre, &post, &aux, expired),
            Err(ProofGenerationError::Timeout)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn windowed_regions_satisfy_constraints(
            sw in 2u32..24, sh in 2u32..24, dw in 1u32..24, dh in 1u32..24,
            fx in 0.0f64..1.0, fy in 0.0f64..1.0,
        ) {
            let src = Dimensions::new(sw, sh);
            let dst = Dimensions::new(dw, dh);
            let ox = ((dw - 1) as f64 * fx) as u32;
            let oy = ((dh - 1) as f64 * fy) as u32;
            let out = Rect::new(ox, oy, dw - ox, dh - oy);
            let first = BilinearTap::at(ox, oy, src, dst);
            let window = Rect::new(first.x.lo, first.y.lo, sw - first.x.lo, sh - first.y.lo);
            let shape = ResizeShape { src, dst, window, out, color: ColorSpace::Rgb };
            prop_assert!(ResizeShape::from_params(&shape.params()).is_ok());
            let full = image(sw, sh);
            let pre = full.region(window).unwrap();
            let post = shape.synthesize(&pre).unwrap();
            let aux = shape.prepare_aux(&pre, &post);
            prop_assert!(shape.check(&pre, &post, &aux, Deadline::none()).is_ok());
        }
    }
}

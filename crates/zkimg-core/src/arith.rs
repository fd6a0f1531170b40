//! # Integer Numeric Contract
//!
//! The exact arithmetic each circuit enforces. Witness preparation, the
//! reference transformations and the constraint checks all go through these
//! functions, so a pixel computed here is bit-identical to what a circuit
//! accepts.
//!
//! ## Rounding
//!
//! Division is made provable with two non-negative remainder terms:
//!
//! ```text
//! numerator == denominator * q - neg_rem + pos_rem
//! pos_rem == 0 || neg_rem == 0
//! 2 * pos_rem < denominator
//! 2 * neg_rem <= denominator
//! ```
//!
//! The bounds pin `numerator - denominator * q` to the half-open interval
//! `[-denominator/2, denominator/2)`, which has exactly one solution: `q`
//! is `numerator / denominator` rounded half-up.
//!
//! ## Grayscale
//!
//! `S = 30R + 59G + 11B`, `gray = round(S / 100)` under the rule above. So
//! `pos_rem <= 49` and `neg_rem <= 50`.
//!
//! ## Bilinear resize (align corners)
//!
//! For output column `ox` of a `dst`-wide image sampled from a `src`-wide
//! source:
//!
//! ```text
//! dx = max(dst - 1, 1)
//! sx = ox * (src - 1)
//! x0 = sx / dx,  fx = sx % dx,  x1 = min(x0 + 1, src - 1)
//! ```
//!
//! and likewise on the y axis. The weighted sum of the four taps is
//! `(dy-fy)*((dx-fx)*p00 + fx*p01) + fy*((dx-fx)*p10 + fx*p11)` over
//! denominator `dx * dy`.

/// Grayscale channel weights, scaled by [`GRAY_SCALE`].
pub const GRAY_WEIGHTS: [u64; 3] = [30, 59, 11];

/// Fixed-point scale of the grayscale weights.
pub const GRAY_SCALE: u64 = 100;

/// A quotient with its provable remainder decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundingSplit {
    pub quotient: u64,
    pub pos_rem: u64,
    pub neg_rem: u64,
}

impl RoundingSplit {
    /// Decompose `numerator` against a claimed `quotient`. The result
    /// satisfies the equality for any quotient; only the correct one also
    /// satisfies [`is_valid`](Self::is_valid).
    pub fn against(numerator: u64, denominator: u64, quotient: u64) -> Self {
        let scaled = denominator as u128 * quotient as u128;
        let numerator = numerator as u128;
        let (pos_rem, neg_rem) = if numerator >= scaled {
            (numerator - scaled, 0)
        } else {
            (0, scaled - numerator)
        };
        Self {
            quotient,
            pos_rem: clamp_u64(pos_rem),
            neg_rem: clamp_u64(neg_rem),
        }
    }

    /// Whether this split satisfies every rounding constraint for
    /// `numerator / denominator`.
    pub fn is_valid(&self, numerator: u64, denominator: u64) -> bool {
        let d = denominator as u128;
        let lhs = numerator as u128 + self.neg_rem as u128;
        let rhs = d * self.quotient as u128 + self.pos_rem as u128;
        lhs == rhs
            && (self.pos_rem == 0 || self.neg_rem == 0)
            && 2 * (self.pos_rem as u128) < d
            && 2 * (self.neg_rem as u128) <= d
    }
}

fn clamp_u64(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// Half-up rounded division and its remainder split.
///
/// `denominator` must be non-zero.
pub fn round_div(numerator: u64, denominator: u64) -> RoundingSplit {
    debug_assert!(denominator > 0);
    let n = numerator as u128;
    let d = denominator as u128;
    let quotient = (2 * n + d) / (2 * d);
    RoundingSplit::against(numerator, denominator, clamp_u64(quotient))
}

/// Weighted luminance numerator `30R + 59G + 11B`.
#[inline]
pub fn luminance_numerator(r: u8, g: u8, b: u8) -> u64 {
    GRAY_WEIGHTS[0] * r as u64 + GRAY_WEIGHTS[1] * g as u64 + GRAY_WEIGHTS[2] * b as u64
}

/// The unique grayscale value and remainders for one RGB pixel.
#[inline]
pub fn grayscale_split(r: u8, g: u8, b: u8) -> RoundingSplit {
    round_div(luminance_numerator(r, g, b), GRAY_SCALE)
}

/// Source taps along one axis for one output coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSample {
    /// Lower source index.
    pub lo: u32,
    /// Upper source index (`lo + 1`, clamped to the last index).
    pub hi: u32,
    /// Weight of `hi`; `lo` carries `denom - frac`.
    pub frac: u64,
    /// Axis denominator.
    pub denom: u64,
}

/// Align-corners sampling of output index `out` when scaling an axis of
/// length `src_len` to `dst_len`. Both lengths must be at least one.
pub fn axis_sample(out: u32, src_len: u32, dst_len: u32) -> AxisSample {
    let denom = u64::from(dst_len.saturating_sub(1).max(1));
    let scaled = u64::from(out) * u64::from(src_len.saturating_sub(1));
    let lo = (scaled / denom) as u32;
    let frac = scaled % denom;
    let last = src_len.saturating_sub(1);
    AxisSample {
        lo,
        hi: (lo + 1).min(last),
        frac,
        denom,
    }
}

/// Four-tap bilinear sample for one output pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BilinearTap {
    pub x: AxisSample,
    pub y: AxisSample,
}

impl BilinearTap {
    /// Taps for output pixel `(ox, oy)` of a `src -> dst` resize.
    pub fn at(ox: u32, oy: u32, src: crate::Dimensions, dst: crate::Dimensions) -> Self {
        Self {
            x: axis_sample(ox, src.width, dst.width),
            y: axis_sample(oy, src.height, dst.height),
        }
    }

    pub fn denominator(&self) -> u64 {
        self.x.denom * self.y.denom
    }

    /// Weighted sum of the four taps `p00, p01, p10, p11`
    /// (`p01` is `(x1, y0)`, `p10` is `(x0, y1)`).
    #[inline]
    pub fn weighted_sum(&self, p00: u8, p01: u8, p10: u8, p11: u8) -> u64 {
        let wx0 = self.x.denom - self.x.frac;
        let wx1 = self.x.frac;
        let wy0 = self.y.denom - self.y.frac;
        let wy1 = self.y.frac;
        let top = wx0 * p00 as u64 + wx1 * p01 as u64;
        let bottom = wx0 * p10 as u64 + wx1 * p11 as u64;
        wy0 * top + wy1 * bottom
    }
}

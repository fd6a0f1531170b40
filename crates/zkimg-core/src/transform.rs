//! # Transformations
//!
//! The permitted image edits and their reference integer semantics. The
//! reference implementations here are what the prover runs to produce an
//! output image; the circuits enforce the same arithmetic (see
//! [`crate::arith`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::arith::{grayscale_split, round_div, BilinearTap};
use crate::error::InputError;
use crate::image::{ColorSpace, Dimensions, PixelMatrix, Rect};

/// Circuit family. One family per transformation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Crop,
    Resize,
    Grayscale,
}

impl TransformKind {
    pub const ALL: [TransformKind; 3] = [Self::Crop, Self::Resize, Self::Grayscale];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Resize => "resize",
            Self::Grayscale => "grayscale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A disclosed image edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformation {
    /// Keep the `width x height` rectangle whose top-left corner is `(x, y)`.
    Crop { x: u32, y: u32, width: u32, height: u32 },
    /// Bilinear (align-corners) resample to `width x height`.
    Resize { width: u32, height: u32 },
    /// RGB to single-channel luminance.
    Grayscale,
}

impl Transformation {
    pub fn kind(&self) -> TransformKind {
        match self {
            Self::Crop { .. } => TransformKind::Crop,
            Self::Resize { .. } => TransformKind::Resize,
            Self::Grayscale => TransformKind::Grayscale,
        }
    }

    /// Check the transformation against a source shape and return the
    /// output shape.
    pub fn validate_for(
        &self,
        source: Dimensions,
        color: ColorSpace,
    ) -> Result<(Dimensions, ColorSpace), InputError> {
        if source.width == 0 {
            return Err(InputError::ZeroDimension { what: "source width" });
        }
        if source.height == 0 {
            return Err(InputError::ZeroDimension { what: "source height" });
        }
        match *self {
            Self::Crop {
                x,
                y,
                width,
                height,
            } => {
                if width == 0 {
                    return Err(InputError::ZeroDimension { what: "crop width" });
                }
                if height == 0 {
                    return Err(InputError::ZeroDimension { what: "crop height" });
                }
                let fits_x = x.checked_add(width).is_some_and(|r| r <= source.width);
                let fits_y = y.checked_add(height).is_some_and(|b| b <= source.height);
                if !fits_x || !fits_y {
                    return Err(InputError::CropOutOfBounds {
                        x,
                        y,
                        width,
                        height,
                        source_width: source.width,
                        source_height: source.height,
                    });
                }
                Ok((Dimensions::new(width, height), color))
            }
            Self::Resize { width, height } => {
                if width == 0 {
                    return Err(InputError::ZeroDimension { what: "resize width" });
                }
                if height == 0 {
                    return Err(InputError::ZeroDimension { what: "resize height" });
                }
                Ok((Dimensions::new(width, height), color))
            }
            Self::Grayscale => {
                if color != ColorSpace::Rgb {
                    return Err(InputError::UnsupportedColor {
                        kind: TransformKind::Grayscale.to_string(),
                        expected: ColorSpace::Rgb.as_str(),
                        found: color.as_str(),
                    });
                }
                Ok((source, ColorSpace::Gray))
            }
        }
    }

    /// Apply the reference transformation.
    pub fn apply(&self, source: &PixelMatrix) -> Result<PixelMatrix, InputError> {
        let (out_dims, _) = self.validate_for(source.dims(), source.color())?;
        match *self {
            Self::Crop { x, y, width, height } => source.region(Rect::new(x, y, width, height)),
            Self::Resize { .. } => resize_window(
                source,
                (0, 0),
                source.dims(),
                out_dims,
                Rect::full(out_dims),
            ),
            Self::Grayscale => grayscale(source),
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crop {
                x,
                y,
                width,
                height,
            } => write!(f, "crop({x},{y},{width},{height})"),
            Self::Resize { width, height } => write!(f, "resize({width},{height})"),
            Self::Grayscale => f.write_str("grayscale"),
        }
    }
}

/// Resample part of a resize.
///
/// `window` is the `window_origin`-anchored piece of a `src_full` image,
/// and `out` the region of the `dst_full` result to compute. Every source
/// tap the output region needs must fall inside the window.
pub fn resize_window(
    window: &PixelMatrix,
    window_origin: (u32, u32),
    src_full: Dimensions,
    dst_full: Dimensions,
    out: Rect,
) -> Result<PixelMatrix, InputError> {
    let (wx, wy) = window_origin;
    let window_rect = Rect::new(wx, wy, window.width(), window.height());
    let channels = window.channels();
    let mut result = PixelMatrix::filled(out.width, out.height, window.color(), 0);
    for oy in out.y..out.bottom() {
        for ox in out.x..out.right() {
            let tap = BilinearTap::at(ox, oy, src_full, dst_full);
            let needed = Rect::new(tap.x.lo, tap.y.lo, tap.x.hi - tap.x.lo + 1, tap.y.hi - tap.y.lo + 1);
            if !window_rect.contains(&needed) {
                return Err(InputError::InvalidParameters {
                    kind: TransformKind::Resize.to_string(),
                    reason: format!("output ({ox},{oy}) samples outside window {window_rect:?}"),
                });
            }
            let (x0, x1) = (tap.x.lo - wx, tap.x.hi - wx);
            let (y0, y1) = (tap.y.lo - wy, tap.y.hi - wy);
            for c in 0..channels {
                let sum = tap.weighted_sum(
                    window.sample(x0, y0, c),
                    window.sample(x1, y0, c),
                    window.sample(x0, y1, c),
                    window.sample(x1, y1, c),
                );
                let value = round_div(sum, tap.denominator()).quotient;
                result.set_sample(ox - out.x, oy - out.y, c, value.min(255) as u8);
            }
        }
    }
    Ok(result)
}

/// Reference grayscale conversion of an RGB image.
pub fn grayscale(source: &PixelMatrix) -> Result<PixelMatrix, InputError> {
    if source.color() != ColorSpace::Rgb {
        return Err(InputError::UnsupportedColor {
            kind: TransformKind::Grayscale.to_string(),
            expected: ColorSpace::Rgb.as_str(),
            found: source.color().as_str(),
        });
    }
    Ok(PixelMatrix::from_fn(
        source.width(),
        source.height(),
        ColorSpace::Gray,
        |x, y, _| {
            let p = source.pixel(x, y);
            grayscale_split(p[0], p[1], p[2]).quotient as u8
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(w: u32, h: u32) -> PixelMatrix {
        PixelMatrix::from_fn(w, h, ColorSpace::Rgb, |x, y, c| ((x * 3 + y * 5) * (c + 1)) as u8)
    }

    #[test]
    fn crop_bounds_are_checked_before_anything_else() {
        let t = Transformation::Crop {
            x: 10,
            y: 0,
            width: 60,
            height: 10,
        };
        let err = t
            .validate_for(Dimensions::new(64, 64), ColorSpace::Rgb)
            .unwrap_err();
        assert!(matches!(err, InputError::CropOutOfBounds { x: 10, width: 60, .. }));
    }

    #[test]
    fn crop_overflowing_u32_is_out_of_bounds() {
        let t = Transformation::Crop {
            x: u32::MAX,
            y: 0,
            width: 2,
            height: 1,
        };
        assert!(t.validate_for(Dimensions::new(8, 8), ColorSpace::Rgb).is_err());
    }

    #[test]
    fn resize_to_zero_is_rejected() {
        let t = Transformation::Resize { width: 0, height: 4 };
        assert_eq!(
            t.validate_for(Dimensions::new(8, 8), ColorSpace::Gray),
            Err(InputError::ZeroDimension { what: "resize width" })
        );
    }

    #[test]
    fn grayscale_requires_rgb() {
        let gray = PixelMatrix::filled(2, 2, ColorSpace::Gray, 9);
        assert!(matches!(
            Transformation::Grayscale.apply(&gray),
            Err(InputError::UnsupportedColor { .. })
        ));
    }

    #[test]
    fn crop_copies_the_offset_pixels() {
        let img = rgb(16, 12);
        let out = Transformation::Crop {
            x: 3,
            y: 4,
            width: 5,
            height: 6,
        }
        .apply(&img)
        .unwrap();
        assert_eq!(out.dims(), Dimensions::new(5, 6));
        assert_eq!(out.pixel(0, 0), img.pixel(3, 4));
        assert_eq!(out.pixel(4, 5), img.pixel(7, 9));
    }

    #[test]
    fn resize_to_same_size_is_identity() {
        let img = rgb(9, 5);
        let out = Transformation::Resize { width: 9, height: 5 }.apply(&img).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn resize_keeps_corners() {
        let img = rgb(31, 17);
        let out = Transformation::Resize { width: 7, height: 4 }.apply(&img).unwrap();
        assert_eq!(out.pixel(0, 0), img.pixel(0, 0));
        assert_eq!(out.pixel(6, 3), img.pixel(30, 16));
    }

    #[test]
    fn resize_window_matches_whole_image() {
        let img = rgb(20, 20);
        let dst = Dimensions::new(7, 9);
        let whole = resize_window(&img, (0, 0), img.dims(), dst, Rect::full(dst)).unwrap();
        let window = img.region(Rect::new(5, 5, 15, 15)).unwrap();
        let out = Rect::new(2, 3, 5, 6);
        let part = resize_window(&window, (5, 5), img.dims(), dst, out).unwrap();
        assert_eq!(part, whole.region(out).unwrap());
    }

    #[test]
    fn resize_window_rejects_missing_taps() {
        let img = rgb(20, 20);
        let window = img.region(Rect::new(10, 10, 10, 10)).unwrap();
        let dst = Dimensions::new(5, 5);
        assert!(resize_window(&window, (10, 10), img.dims(), dst, Rect::full(dst)).is_err());
    }

    #[test]
    fn grayscale_uses_rounded_weights() {
        let img = PixelMatrix::new(1, 1, ColorSpace::Rgb, vec![100, 150, 200]).unwrap();
        let out = grayscale(&img).unwrap();
        // 3000 + 8850 + 2200 = 14050 -> 140.5 -> 141
        assert_eq!(out.data(), &[141]);
    }

    #[test]
    fn transformation_serializes_with_kind_tag() {
        let json = serde_json::to_value(Transformation::Resize { width: 4, height: 2 }).unwrap();
        assert_eq!(json["kind"], "resize");
        assert_eq!(json["width"], 4);
    }
}

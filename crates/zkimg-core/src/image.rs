//! # Pixel Matrices
//!
//! Decoded images as handed to the core by the codec collaborator. A
//! [`PixelMatrix`] is private witness material: it is zeroized on drop, its
//! `Debug` output never includes pixel data, and it deliberately does not
//! implement `Serialize` so it cannot end up in a bundle or audit record.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::InputError;

/// Channel layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    /// Interleaved 8-bit R, G, B.
    Rgb,
    /// Single 8-bit luminance channel.
    Gray,
}

impl ColorSpace {
    pub fn channels(self) -> u32 {
        match self {
            Self::Rgb => 3,
            Self::Gray => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Gray => "gray",
        }
    }

    /// Inverse of [`channels`](Self::channels).
    pub fn from_channels(channels: u32) -> Option<Self> {
        match channels {
            3 => Some(Self::Rgb),
            1 => Some(Self::Gray),
            _ => None,
        }
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle covering a whole image.
    pub const fn full(dims: Dimensions) -> Self {
        Self::new(0, 0, dims.width, dims.height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn dims(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap of two rectangles, `None` when they do not intersect.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > x && bottom > y).then(|| Rect::new(x, y, right - x, bottom - y))
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// A decoded image: row-major, channel-interleaved 8-bit samples.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PixelMatrix {
    width: u32,
    height: u32,
    #[zeroize(skip)]
    color: ColorSpace,
    data: Vec<u8>,
}

impl PixelMatrix {
    /// Wrap a decoded buffer. The buffer length must be
    /// `width * height * channels`.
    pub fn new(width: u32, height: u32, color: ColorSpace, data: Vec<u8>) -> Result<Self, InputError> {
        let expected = width as usize * height as usize * color.channels() as usize;
        if data.len() != expected {
            return Err(InputError::PixelBufferLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            color,
            data,
        })
    }

    /// An image with every sample set to `value`.
    pub fn filled(width: u32, height: u32, color: ColorSpace, value: u8) -> Self {
        let len = width as usize * height as usize * color.channels() as usize;
        Self {
            width,
            height,
            color,
            data: vec![value; len],
        }
    }

    /// Build an image by evaluating `f(x, y, channel)` for every sample.
    pub fn from_fn(
        width: u32,
        height: u32,
        color: ColorSpace,
        mut f: impl FnMut(u32, u32, u32) -> u8,
    ) -> Self {
        let channels = color.channels();
        let mut data = Vec::with_capacity(width as usize * height as usize * channels as usize);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    data.push(f(x, y, c));
                }
            }
        }
        Self {
            width,
            height,
            color,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dims(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn color(&self) -> ColorSpace {
        self.color
    }

    pub fn channels(&self) -> u32 {
        self.color.channels()
    }

    /// Raw interleaved samples.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels() as usize
    }

    /// One sample. Panics when out of range; callers index within
    /// validated shapes.
    #[inline]
    pub fn sample(&self, x: u32, y: u32, channel: u32) -> u8 {
        self.data[self.offset(x, y) + channel as usize]
    }

    /// All channels of one pixel.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + self.channels() as usize]
    }

    #[inline]
    pub fn set_sample(&mut self, x: u32, y: u32, channel: u32, value: u8) {
        let i = self.offset(x, y) + channel as usize;
        self.data[i] = value;
    }

    /// Copy out a sub-rectangle. The rectangle must lie inside the image.
    pub fn region(&self, rect: Rect) -> Result<PixelMatrix, InputError> {
        if !Rect::full(self.dims()).contains(&rect) {
            return Err(InputError::CropOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                source_width: self.width,
                source_height: self.height,
            });
        }
        let row_len = rect.width as usize * self.channels() as usize;
        let mut data = Vec::with_capacity(row_len * rect.height as usize);
        for y in rect.y..rect.bottom() {
            let start = self.offset(rect.x, y);
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Ok(PixelMatrix {
            width: rect.width,
            height: rect.height,
            color: self.color,
            data,
        })
    }

    /// Paste `src` with its top-left corner at `(x, y)`.
    pub fn blit(&mut self, src: &PixelMatrix, x: u32, y: u32) -> Result<(), InputError> {
        let target = Rect::new(x, y, src.width, src.height);
        if src.color != self.color || !Rect::full(self.dims()).contains(&target) {
            return Err(InputError::OutputShapeMismatch {
                expected: format!("{} {} inside {}", src.dims(), src.color.as_str(), self.dims()),
                actual: format!("placement at ({x},{y})"),
            });
        }
        let row_len = src.width as usize * self.channels() as usize;
        for row in 0..src.height {
            let dst = self.offset(x, y + row);
            let from = src.offset(0, row);
            self.data[dst..dst + row_len].copy_from_slice(&src.data[from..from + row_len]);
        }
        Ok(())
    }

    /// Short shape description for diagnostics, e.g. `"512x512 rgb"`.
    pub fn describe(&self) -> String {
        format!("{} {}", self.dims(), self.color.as_str())
    }
}

impl fmt::Debug for PixelMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelMatrix")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("color", &self.color)
            .field("data", &format_args!("[{} bytes redacted]", self.data.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> PixelMatrix {
        PixelMatrix::from_fn(w, h, ColorSpace::Rgb, |x, y, c| (x * 7 + y * 13 + c * 31) as u8)
    }

    #[test]
    fn new_rejects_wrong_buffer_length() {
        let err = PixelMatrix::new(2, 2, ColorSpace::Rgb, vec![0; 11]).unwrap_err();
        assert_eq!(
            err,
            InputError::PixelBufferLength {
                expected: 12,
                actual: 11
            }
        );
    }

    #[test]
    fn region_then_blit_restores_image() {
        let img = gradient(9, 7);
        let part = img.region(Rect::new(2, 3, 4, 2)).unwrap();
        assert_eq!(part.pixel(0, 0), img.pixel(2, 3));
        assert_eq!(part.pixel(3, 1), img.pixel(5, 4));

        let mut canvas = PixelMatrix::filled(9, 7, ColorSpace::Rgb, 0);
        for y in 0..7 {
            let row = img.region(Rect::new(0, y, 9, 1)).unwrap();
            canvas.blit(&row, 0, y).unwrap();
        }
        assert_eq!(canvas, img);
    }

    #[test]
    fn region_out_of_bounds_is_rejected() {
        let img = gradient(4, 4);
        assert!(matches!(
            img.region(Rect::new(2, 2, 3, 1)),
            Err(InputError::CropOutOfBounds { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_pixels() {
        let img = PixelMatrix::filled(2, 2, ColorSpace::Gray, 0xAB);
        let dbg = format!("{img:?}");
        assert!(dbg.contains("redacted"));
        assert!(!dbg.contains("171"));
    }

    #[test]
    fn rect_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 8, 10, 10);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 8, 5, 2)));
        assert_eq!(a.intersect(&Rect::new(10, 0, 3, 3)), None);
    }
}

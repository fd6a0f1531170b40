//! # Error Types — Input Validation
//!
//! Everything a caller can get wrong about a request is an [`InputError`].
//! These are detected synchronously, before any circuit is compiled or any
//! proof is attempted, and carry enough context (parameter name, offending
//! bound, coordinates) for the caller to correct the request and retry.

use thiserror::Error;

/// A request was rejected before any compilation or proving work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The crop rectangle does not lie inside the source image.
    #[error(
        "crop ({x},{y},{width},{height}) exceeds source bounds {source_width}x{source_height}"
    )]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },

    /// A dimension that must be at least one was zero.
    #[error("{what} must be at least 1")]
    ZeroDimension {
        /// Which dimension was zero (e.g. `"resize width"`).
        what: &'static str,
    },

    /// A circuit parameter the transformation kind requires was absent.
    #[error("missing parameter `{name}` for {kind} circuit")]
    MissingParameter {
        /// Transformation kind the parameters were supplied for.
        kind: String,
        /// Name of the first missing parameter.
        name: &'static str,
    },

    /// A circuit parameter combination is internally inconsistent.
    #[error("invalid {kind} circuit parameters: {reason}")]
    InvalidParameters { kind: String, reason: String },

    /// A source or result dimension exceeds the single-circuit maximum.
    #[error("dimension limit exceeded: {bound} = {value} > {limit}")]
    DimensionLimitExceeded {
        /// Name of the offending bound (e.g. `orig_width`).
        bound: String,
        value: u32,
        limit: u32,
    },

    /// The pixel buffer does not match the declared shape.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    PixelBufferLength { expected: usize, actual: usize },

    /// The transformation cannot be applied to the image's colour layout.
    #[error("{kind} requires {expected} input, got {found}")]
    UnsupportedColor {
        kind: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A supplied output image does not have the shape the transformation
    /// produces.
    #[error("output image is {actual}, transformation produces {expected}")]
    OutputShapeMismatch { expected: String, actual: String },

    /// Decomposition would produce more tiles than configured.
    #[error("image requires {tiles} tiles, limit is {limit}")]
    TooManyTiles { tiles: usize, limit: usize },

    /// Malformed hex input.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

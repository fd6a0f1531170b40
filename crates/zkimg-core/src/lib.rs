//! # zkimg-core — Transformation Model
//!
//! Foundational types for proving image provenance:
//!
//! - [`PixelMatrix`]: decoded image data, the private half of every witness.
//! - [`Transformation`]: the disclosed edit (crop, resize, grayscale) with
//!   validation against a source shape and a reference implementation.
//! - [`arith`]: the integer numeric contract the circuits enforce. Resize
//!   and grayscale round with provable remainder terms instead of floating
//!   point.
//! - [`CircuitParams`] / [`CircuitKey`]: the concrete shape a circuit is
//!   compiled for and its cache identity.
//! - [`ContentDigest`]: SHA-256 pins for artifacts.
//! - [`Deadline`]: cancellation bound carried by compile and prove calls.
//!
//! This crate has no async or I/O dependencies; everything above it
//! (commitments, proving, chaining) builds on these types.

pub mod arith;
pub mod deadline;
pub mod digest;
pub mod error;
pub mod image;
pub mod params;
pub mod transform;

pub use deadline::Deadline;
pub use digest::{ContentDigest, Sha256Accumulator};
pub use error::InputError;
pub use image::{ColorSpace, Dimensions, PixelMatrix, Rect};
pub use params::{CircuitKey, CircuitParams};
pub use transform::{TransformKind, Transformation};

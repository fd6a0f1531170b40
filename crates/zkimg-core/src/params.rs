//! # Circuit Parameters and Keys
//!
//! A circuit is compiled for one concrete shape: its transformation kind and
//! a set of named integer parameters (dimensions, offsets, channel count).
//! [`CircuitKey`] is the cache identity derived from both.
//!
//! ## Key rendering
//!
//! `{kind}/{name}-{value}_{name}-{value}...` with names in sorted order,
//! e.g. `crop/channels-3_new_height-512_...`. Names are restricted to
//! `[a-z_]` and values are decimal, so `-` unambiguously separates a name
//! from its value and the rendering is injective.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::transform::TransformKind;

/// Canonical parameter names.
pub mod names {
    pub const ORIG_WIDTH: &str = "orig_width";
    pub const ORIG_HEIGHT: &str = "orig_height";
    pub const NEW_WIDTH: &str = "new_width";
    pub const NEW_HEIGHT: &str = "new_height";
    pub const START_X: &str = "start_x";
    pub const START_Y: &str = "start_y";
    pub const CHANNELS: &str = "channels";
    /// Full source extent of a (possibly windowed) resize.
    pub const SRC_WIDTH: &str = "src_width";
    pub const SRC_HEIGHT: &str = "src_height";
    /// Full target extent of a (possibly windowed) resize.
    pub const DST_WIDTH: &str = "dst_width";
    pub const DST_HEIGHT: &str = "dst_height";
    /// Top-left of the witnessed source window.
    pub const WINDOW_X: &str = "window_x";
    pub const WINDOW_Y: &str = "window_y";
    /// Top-left of the produced output region.
    pub const OUT_X: &str = "out_x";
    pub const OUT_Y: &str = "out_y";
}

/// Parameters each kind requires, in the order they are reported missing.
pub fn required_params(kind: TransformKind) -> &'static [&'static str] {
    use names::*;
    match kind {
        TransformKind::Crop => &[
            ORIG_HEIGHT,
            ORIG_WIDTH,
            NEW_HEIGHT,
            NEW_WIDTH,
            START_Y,
            START_X,
            CHANNELS,
        ],
        TransformKind::Resize => &[
            ORIG_HEIGHT,
            ORIG_WIDTH,
            NEW_HEIGHT,
            NEW_WIDTH,
            CHANNELS,
            SRC_HEIGHT,
            SRC_WIDTH,
            DST_HEIGHT,
            DST_WIDTH,
            WINDOW_Y,
            WINDOW_X,
            OUT_Y,
            OUT_X,
        ],
        TransformKind::Grayscale => &[ORIG_HEIGHT, ORIG_WIDTH],
    }
}

/// Bounds checked against the single-circuit dimension limit.
pub fn dimension_params(kind: TransformKind) -> &'static [&'static str] {
    use names::*;
    match kind {
        TransformKind::Crop | TransformKind::Resize => {
            &[ORIG_WIDTH, ORIG_HEIGHT, NEW_WIDTH, NEW_HEIGHT]
        }
        TransformKind::Grayscale => &[ORIG_WIDTH, ORIG_HEIGHT],
    }
}

/// Sorted name/value parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitParams(BTreeMap<String, u32>);

impl CircuitParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: u32) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: u32) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.0.get(name).copied()
    }

    /// Look up a parameter the `kind` circuit cannot do without.
    pub fn require(&self, kind: TransformKind, name: &'static str) -> Result<u32, InputError> {
        self.get(name).ok_or_else(|| InputError::MissingParameter {
            kind: kind.to_string(),
            name,
        })
    }

    /// Fail on the first required parameter that is absent.
    pub fn check_required(&self, kind: TransformKind) -> Result<(), InputError> {
        for name in required_params(kind) {
            self.require(kind, name)?;
        }
        Ok(())
    }

    /// Keep only the parameters `kind` uses.
    pub fn normalized(&self, kind: TransformKind) -> Result<Self, InputError> {
        let mut out = Self::new();
        for name in required_params(kind) {
            out.insert(name, self.require(kind, name)?);
        }
        Ok(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `name-value` pairs joined by `_`, in name order.
    pub fn signature(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}-{v}"))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Cache identity of one compiled circuit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitKey {
    kind: TransformKind,
    params: CircuitParams,
}

impl CircuitKey {
    /// Derive the key, normalizing the parameters to those `kind` requires.
    pub fn derive(kind: TransformKind, params: &CircuitParams) -> Result<Self, InputError> {
        Ok(Self {
            kind,
            params: params.normalized(kind)?,
        })
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn params(&self) -> &CircuitParams {
        &self.params
    }

    pub fn signature(&self) -> String {
        self.params.signature()
    }

    /// Relative directory of this key in the artifact store.
    pub fn store_path(&self) -> (String, String) {
        (self.kind.to_string(), self.signature())
    }
}

impl fmt::Display for CircuitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::names::*;
    use super::*;

    fn grayscale_params(w: u32, h: u32) -> CircuitParams {
        CircuitParams::new().with(ORIG_WIDTH, w).with(ORIG_HEIGHT, h)
    }

    #[test]
    fn signature_is_sorted_by_name() {
        let p = CircuitParams::new().with(START_X, 4).with(CHANNELS, 3).with(NEW_WIDTH, 9);
        assert_eq!(p.signature(), "channels-3_new_width-9_start_x-4");
    }

    #[test]
    fn key_is_insertion_order_independent() {
        let a = grayscale_params(8, 4);
        let b = CircuitParams::new().with(ORIG_HEIGHT, 4).with(ORIG_WIDTH, 8);
        assert_eq!(
            CircuitKey::derive(TransformKind::Grayscale, &a).unwrap(),
            CircuitKey::derive(TransformKind::Grayscale, &b).unwrap()
        );
    }

    #[test]
    fn key_ignores_unrelated_params() {
        let a = grayscale_params(8, 4);
        let b = grayscale_params(8, 4).with(START_X, 99);
        let ka = CircuitKey::derive(TransformKind::Grayscale, &a).unwrap();
        let kb = CircuitKey::derive(TransformKind::Grayscale, &b).unwrap();
        assert_eq!(ka, kb);
        assert_eq!(ka.to_string(), "grayscale/orig_height-4_orig_width-8");
    }

    #[test]
    fn distinct_kinds_give_distinct_keys() {
        let p = grayscale_params(8, 4)
            .with(NEW_WIDTH, 8)
            .with(NEW_HEIGHT, 4)
            .with(START_X, 0)
            .with(START_Y, 0)
            .with(CHANNELS, 3);
        let crop = CircuitKey::derive(TransformKind::Crop, &p).unwrap();
        let gray = CircuitKey::derive(TransformKind::Grayscale, &p).unwrap();
        assert_ne!(crop, gray);
    }

    #[test]
    fn missing_parameter_reported_by_name() {
        let p = CircuitParams::new()
            .with(ORIG_HEIGHT, 10)
            .with(ORIG_WIDTH, 10)
            .with(NEW_HEIGHT, 5)
            .with(NEW_WIDTH, 5)
            .with(START_Y, 0);
        let err = CircuitKey::derive(TransformKind::Crop, &p).unwrap_err();
        assert_eq!(
            err,
            InputError::MissingParameter {
                kind: "crop".to_string(),
                name: START_X
            }
        );
    }
}

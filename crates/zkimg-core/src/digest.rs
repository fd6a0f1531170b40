//! # Content Digest
//!
//! SHA-256 digests used to pin artifacts: verification keys, proving keys and
//! the trusted-setup file. Image commitments are *not* SHA-256; they are
//! Poseidon field elements (see `zkimg-crypto`), since they must be provable
//! inside a circuit. SHA-256 is only used where a value never enters one.
//!
//! Digests serialize as lowercase hex strings.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::InputError;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    bytes: [u8; 32],
}

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Digest of a single byte string.
    pub fn sha256(data: &[u8]) -> Self {
        let mut acc = Sha256Accumulator::new();
        acc.update(data);
        acc.finalize()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, InputError> {
        let bytes = decode_hex(s)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| InputError::InvalidHex(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self { bytes })
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Streaming SHA-256, for inputs too large to hold in memory (the
/// powers-of-tau file) or assembled from several parts.
#[derive(Clone, Default)]
pub struct Sha256Accumulator {
    hasher: Sha256,
}

impl Sha256Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the running digest.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    /// Consume the accumulator.
    pub fn finalize(self) -> ContentDigest {
        ContentDigest {
            bytes: self.hasher.finalize().into(),
        }
    }
}

/// Decode a lowercase or uppercase hex string.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, InputError> {
    if s.len() % 2 != 0 {
        return Err(InputError::InvalidHex(format!("odd length {}", s.len())));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| InputError::InvalidHex(format!("bad hex at offset {i}")))
        })
        .collect()
}

/// Encode bytes as lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Serde adapter for `Vec<u8>` fields stored as hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex(&s).map_err(serde::de::Error::custom)
    }
}

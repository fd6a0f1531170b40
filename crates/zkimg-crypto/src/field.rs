//! # BN254 Field Elements
//!
//! [`FieldElement`] is the wire form of every circuit-facing value: image
//! commitments, Merkle nodes, chain accumulators and public signals. It holds
//! the canonical 32-byte big-endian encoding of a BN254 scalar, so equality
//! on bytes is equality in the field.
//!
//! Two renderings:
//! - `0x`-prefixed hex (serde, `Display`), used in bundles and manifests.
//! - Decimal strings, the public-signal convention of circom/snarkjs.
//!
//! Parsers reject encodings of values at or above the field modulus.

use std::fmt;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

/// A canonical BN254 scalar-field element.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement([u8; 32]);

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement([0u8; 32]);

    pub fn from_fr(value: Fr) -> Self {
        let bytes = value.into_bigint().to_bytes_be();
        let mut out = [0u8; 32];
        let start = 32usize.saturating_sub(bytes.len());
        out[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(32)..]);
        Self(out)
    }

    pub fn to_fr(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_fr(Fr::from(value))
    }

    /// Interpret arbitrary bytes as a big-endian integer reduced into the
    /// field. Used to bind non-field data (proof bytes, SHA-256 digests).
    pub fn reduce_be_bytes(bytes: &[u8]) -> Self {
        Self::from_fr(Fr::from_be_bytes_mod_order(bytes))
    }

    /// Accept a 32-byte encoding only if it is canonical.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let candidate = Self(bytes);
        if Self::from_fr(candidate.to_fr()) != candidate {
            return Err(CryptoError::NonCanonicalField(format!(
                "0x{} is not below the BN254 modulus",
                hex(&bytes)
            )));
        }
        Ok(candidate)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Constant-time equality.
    pub fn ct_eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex(&self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(CryptoError::Decode(format!(
                "field element hex must be 64 digits, got {}",
                digits.len()
            )));
        }
        let raw = zkimg_core::digest::decode_hex(digits)
            .map_err(|e| CryptoError::Decode(e.to_string()))?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Self::from_be_bytes(bytes)
    }

    /// Decimal rendering, as used in public signal vectors.
    pub fn to_decimal(&self) -> String {
        let mut n = self.0;
        let mut digits = Vec::with_capacity(78);
        while n.iter().any(|&b| b != 0) {
            let mut rem: u32 = 0;
            for byte in n.iter_mut() {
                let cur = (rem << 8) | u32::from(*byte);
                *byte = (cur / 10) as u8;
                rem = cur % 10;
            }
            digits.push(b'0' + rem as u8);
        }
        if digits.is_empty() {
            return "0".to_string();
        }
        digits.reverse();
        String::from_utf8(digits).unwrap_or_default()
    }

    /// Parse a decimal public signal.
    pub fn from_decimal(s: &str) -> Result<Self, CryptoError> {
        if s.is_empty() || s.len() > 78 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CryptoError::Decode(format!("not a decimal field element: {s:?}")));
        }
        let mut n = [0u8; 32];
        for digit in s.bytes().map(|b| u32::from(b - b'0')) {
            let mut carry = digit;
            for byte in n.iter_mut().rev() {
                let cur = u32::from(*byte) * 10 + carry;
                *byte = (cur & 0xff) as u8;
                carry = cur >> 8;
            }
            if carry != 0 {
                return Err(CryptoError::NonCanonicalField(format!(
                    "{s} does not fit in 256 bits"
                )));
            }
        }
        Self::from_be_bytes(n)
    }
}

fn hex(bytes: &[u8]) -> String {
    zkimg_core::digest::encode_hex(bytes)
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Fr> for FieldElement {
    fn from(value: Fr) -> Self {
        Self::from_fr(value)
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

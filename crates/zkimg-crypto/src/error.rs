//! # Cryptographic Error Types
//!
//! Structured errors for commitments, Merkle folding and the filesystem
//! stores in `zkimg-crypto`.

use thiserror::Error;

/// Errors from commitment and storage operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The Poseidon permutation rejected its input.
    #[error("Poseidon error: {0}")]
    Poseidon(String),

    /// A field element encoding is not the canonical representative.
    #[error("non-canonical field element: {0}")]
    NonCanonicalField(String),

    /// Hex or decimal decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Merkle operation error.
    #[error("Merkle error: {0}")]
    Merkle(String),

    /// Artifact or record store error.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error (store filesystem operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of a stored document failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = CryptoError::Store("segment `..` rejected".to_string());
        assert!(format!("{err}").contains("segment"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CryptoError = io.into();
        assert!(matches!(err, CryptoError::Io(_)));
        assert!(format!("{err}").contains("denied"));
    }
}

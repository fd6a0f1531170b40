//! # Circuit Artifacts
//!
//! The compiled form of one circuit instance: constraint system, proving key
//! and verification key, plus a manifest recording what they were built from.
//!
//! ## Layout
//!
//! ```text
//! <artifact_dir>/<kind>/<signature>/
//!     manifest.json
//!     circuit.r1cs
//!     circuit.zkey
//!     verification_key.json
//!     ...backend-specific extras (e.g. witness generator)
//! ```
//!
//! A persisted entry is only reused when its manifest names the same key,
//! backend and trusted-setup fingerprint, and every file still has the
//! digest the manifest recorded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zkimg_core::digest::hex_bytes;
use zkimg_core::{CircuitKey, ContentDigest};
use zkimg_crypto::{file_digest, verify_file_digest};

use crate::circuits::CircuitShape;
use crate::error::{ArtifactPersistenceError, SetupError};
use crate::traits::BackendKind;

pub const CONSTRAINT_SYSTEM_FILE: &str = "circuit.r1cs";
pub const PROVING_KEY_FILE: &str = "circuit.zkey";
pub const VERIFICATION_KEY_FILE: &str = "verification_key.json";

/// Bumped whenever the on-disk layout or manifest meaning changes.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Trusted setup
// ---------------------------------------------------------------------------

/// The universal powers-of-tau file every circuit's keys derive from.
#[derive(Debug, Clone)]
pub struct TrustedSetup {
    path: PathBuf,
    fingerprint: ContentDigest,
}

impl TrustedSetup {
    /// Read and fingerprint the setup file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SetupError> {
        let path = path.into();
        if !path.is_file() {
            return Err(SetupError::Missing { path });
        }
        let fingerprint = file_digest(&path).map_err(|e| SetupError::Unreadable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { path, fingerprint })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SHA-256 of the setup file.
    pub fn fingerprint(&self) -> &ContentDigest {
        &self.fingerprint
    }
}

// ---------------------------------------------------------------------------
// Verification key
// ---------------------------------------------------------------------------

/// A circuit's verification key, as the verifier sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    backend: BackendKind,
    circuit: CircuitKey,
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
    digest: ContentDigest,
}

impl VerificationKey {
    pub fn new(backend: BackendKind, circuit: CircuitKey, bytes: Vec<u8>) -> Self {
        let digest = ContentDigest::sha256(&bytes);
        Self {
            backend,
            circuit,
            bytes,
            digest,
        }
    }

    /// Read the key file from an artifact directory.
    pub fn read(backend: BackendKind, circuit: CircuitKey, dir: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(dir.join(VERIFICATION_KEY_FILE))?;
        Ok(Self::new(backend, circuit, bytes))
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn circuit(&self) -> &CircuitKey {
        &self.circuit
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 of the key bytes. Proofs carry it to bind themselves to
    /// one key.
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Provenance record written next to compiled artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub circuit: CircuitKey,
    pub backend: BackendKind,
    pub setup_fingerprint: ContentDigest,
    pub constraint_count: u64,
    pub constraint_system_digest: ContentDigest,
    pub proving_key_digest: ContentDigest,
    pub verification_key_digest: ContentDigest,
    pub compiled_at: DateTime<Utc>,
    pub compile_ms: u64,
}

impl ArtifactManifest {
    /// Hash the three artifact files in `dir` into a fresh manifest.
    pub fn describe(
        dir: &Path,
        circuit: CircuitKey,
        backend: BackendKind,
        setup: &TrustedSetup,
        constraint_count: u64,
        compile_time: Duration,
    ) -> Result<Self, zkimg_crypto::CryptoError> {
        Ok(Self {
            format_version: MANIFEST_FORMAT_VERSION,
            circuit,
            backend,
            setup_fingerprint: *setup.fingerprint(),
            constraint_count,
            constraint_system_digest: file_digest(&dir.join(CONSTRAINT_SYSTEM_FILE))?,
            proving_key_digest: file_digest(&dir.join(PROVING_KEY_FILE))?,
            verification_key_digest: file_digest(&dir.join(VERIFICATION_KEY_FILE))?,
            compiled_at: Utc::now(),
            compile_ms: u64::try_from(compile_time.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Whether a persisted manifest can serve `key` under `backend` and
    /// `setup`. `Err` carries the first difference found.
    pub fn matches(
        &self,
        key: &CircuitKey,
        backend: BackendKind,
        setup: &ContentDigest,
    ) -> Result<(), String> {
        if self.format_version != MANIFEST_FORMAT_VERSION {
            return Err(format!(
                "format version {} (expected {MANIFEST_FORMAT_VERSION})",
                self.format_version
            ));
        }
        if &self.circuit != key {
            return Err(format!("manifest names circuit {}", self.circuit));
        }
        if self.backend != backend {
            return Err(format!("compiled for backend {}", self.backend));
        }
        if &self.setup_fingerprint != setup {
            return Err("compiled against a different trusted setup".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ArtifactSet
// ---------------------------------------------------------------------------

/// A compiled, ready-to-prove circuit.
#[derive(Debug)]
pub struct ArtifactSet {
    key: CircuitKey,
    shape: CircuitShape,
    manifest: ArtifactManifest,
    dir: PathBuf,
    verification_key: VerificationKey,
    persistence_error: Option<ArtifactPersistenceError>,
    /// Keeps an unpublished staging directory alive for as long as the
    /// artifact is resident.
    _staging: Option<tempfile::TempDir>,
}

impl ArtifactSet {
    /// Open a persisted (or freshly staged) artifact directory, checking
    /// each file against the manifest digests.
    pub fn load(dir: &Path, manifest: ArtifactManifest, shape: CircuitShape) -> Result<Self, String> {
        let checks = [
            (CONSTRAINT_SYSTEM_FILE, &manifest.constraint_system_digest),
            (PROVING_KEY_FILE, &manifest.proving_key_digest),
            (VERIFICATION_KEY_FILE, &manifest.verification_key_digest),
        ];
        for (name, digest) in checks {
            verify_file_digest(&dir.join(name), digest).map_err(|e| format!("{name}: {e}"))?;
        }
        let verification_key = VerificationKey::read(manifest.backend, manifest.circuit.clone(), dir)
            .map_err(|e| format!("{VERIFICATION_KEY_FILE}: {e}"))?;
        Ok(Self {
            key: manifest.circuit.clone(),
            shape,
            manifest,
            dir: dir.to_path_buf(),
            verification_key,
            persistence_error: None,
            _staging: None,
        })
    }

    /// An artifact that lives only in its staging directory because it
    /// could not be published.
    pub(crate) fn unpublished(
        mut self,
        staging: tempfile::TempDir,
        error: ArtifactPersistenceError,
    ) -> Self {
        self.persistence_error = Some(error);
        self._staging = Some(staging);
        self
    }

    pub fn key(&self) -> &CircuitKey {
        &self.key
    }

    pub fn shape(&self) -> &CircuitShape {
        &self.shape
    }

    pub fn manifest(&self) -> &ArtifactManifest {
        &self.manifest
    }

    /// Directory holding the artifact files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn verification_key(&self) -> &VerificationKey {
        &self.verification_key
    }

    pub fn constraint_count(&self) -> u64 {
        self.manifest.constraint_count
    }

    /// Set when the artifact is usable but was not persisted.
    pub fn persistence_error(&self) -> Option<&ArtifactPersistenceError> {
        self.persistence_error.as_ref()
    }

    pub fn is_persisted(&self) -> bool {
        self.persistence_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkimg_core::{ColorSpace, Dimensions, Transformation};

    fn shape() -> CircuitShape {
        CircuitShape::for_transformation(&Transformation::Grayscale, Dimensions::new(4, 4), ColorSpace::Rgb)
            .unwrap()
    }

    fn setup(dir: &Path) -> TrustedSetup {
        let path = dir.join("pot.ptau");
        std::fs::write(&path, b"powers of tau").unwrap();
        TrustedSetup::load(path).unwrap()
    }

    fn write_artifacts(dir: &Path) {
        std::fs::write(dir.join(CONSTRAINT_SYSTEM_FILE), b"r1cs").unwrap();
        std::fs::write(dir.join(PROVING_KEY_FILE), b"zkey").unwrap();
        std::fs::write(dir.join(VERIFICATION_KEY_FILE), b"{\"vk\":1}").unwrap();
    }

    #[test]
    fn missing_setup_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let err = TrustedSetup::load(tmp.path().join("absent.ptau")).unwrap_err();
        assert!(matches!(err, SetupError::Missing { .. }));
    }

    #[test]
    fn manifest_round_trip_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let setup = setup(tmp.path());
        write_artifacts(tmp.path());
        let key = shape().key().unwrap();
        let manifest = ArtifactManifest::describe(
            tmp.path(),
            key.clone(),
            BackendKind::Mock,
            &setup,
            99,
            Duration::from_millis(5),
        )
        .unwrap();
        let json = serde_json::to_string(&manifest).unwrap();
        let back: ArtifactManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
        assert!(back.matches(&key, BackendKind::Mock, setup.fingerprint()).is_ok());

        let set = ArtifactSet::load(tmp.path(), back, shape()).unwrap();
        assert_eq!(set.verification_key().bytes(), b"{\"vk\":1}");
        assert_eq!(set.constraint_count(), 99);
        assert!(set.is_persisted());
    }

    #[test]
    fn tampered_file_fails_load() {
        let tmp = tempfile::tempdir().unwrap();
        let setup = setup(tmp.path());
        write_artifacts(tmp.path());
        let key = shape().key().unwrap();
        let manifest =
            ArtifactManifest::describe(tmp.path(), key, BackendKind::Mock, &setup, 1, Duration::ZERO).unwrap();
        std::fs::write(tmp.path().join(PROVING_KEY_FILE), b"zkey!").unwrap();
        let err = ArtifactSet::load(tmp.path(), manifest, shape()).unwrap_err();
        assert!(err.contains(PROVING_KEY_FILE));
    }

    #[test]
    fn manifest_mismatch_reasons() {
        let tmp = tempfile::tempdir().unwrap();
        let setup = setup(tmp.path());
        write_artifacts(tmp.path());
        let key = shape().key().unwrap();
        let manifest =
            ArtifactManifest::describe(tmp.path(), key.clone(), BackendKind::Mock, &setup, 1, Duration::ZERO)
                .unwrap();
        assert!(manifest
            .matches(&key, BackendKind::Groth16, setup.fingerprint())
            .unwrap_err()
            .contains("backend"));
        let other = ContentDigest::sha256(b"another ceremony");
        assert!(manifest
            .matches(&key, BackendKind::Mock, &other)
            .unwrap_err()
            .contains("trusted setup"));
    }
}

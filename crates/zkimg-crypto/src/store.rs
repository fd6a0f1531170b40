//! # Artifact and Proof Record Stores
//!
//! Filesystem persistence for compiled circuits and audit records.
//!
//! ## Artifact layout
//!
//! ```text
//! {base_dir}/{kind}/{param-signature}/
//!     circuit.r1cs  circuit.zkey  verification_key.json  manifest.json
//! ```
//!
//! An artifact directory only ever appears complete. Writers fill a staging
//! directory, copy it to `{base_dir}/{kind}/.incoming-{uuid}` (same
//! filesystem as the destination) and publish with a single `rename`. A
//! stale entry is first renamed aside, never rewritten in place, so a reader
//! or a writer that dies mid-copy can never observe a half-written key.
//!
//! ## Proof records
//!
//! `{base_dir}/{kind}/{timestamp}_{random}_{param-signature}.json`, written
//! to a hidden temp file and renamed into place. Records hold proofs and
//! public signals; callers never pass witness data here.
//!
//! ## Path segments
//!
//! Kinds and signatures must match `^[a-z0-9][a-z0-9_-]{0,199}$`, which
//! rules out separators, `..` and hidden names.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use subtle::ConstantTimeEq;
use zkimg_core::{ContentDigest, Sha256Accumulator};

use crate::error::CryptoError;

/// Manifest file name inside an artifact directory.
pub const MANIFEST_FILE: &str = "manifest.json";

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_segment<'a>(what: &str, segment: &'a str) -> Result<&'a str, CryptoError> {
    if segment.is_empty() || segment.len() > 200 {
        return Err(CryptoError::Store(format!(
            "{what} must be 1-200 chars, got {}",
            segment.len()
        )));
    }
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => {
            return Err(CryptoError::Store(format!(
                "{what} must start with [a-z0-9], got: {segment:?}"
            )))
        }
    }
    if let Some(c) = chars.find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')) {
        return Err(CryptoError::Store(format!(
            "{what} contains invalid character {c:?}: must match [a-z0-9_-]"
        )));
    }
    Ok(segment)
}

/// Streaming SHA-256 of a file.
pub fn file_digest(path: &Path) -> Result<ContentDigest, CryptoError> {
    let mut file = fs::File::open(path)?;
    let mut acc = Sha256Accumulator::new();
    let mut buf = vec![0u8; 1 << 16];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        acc.update(&buf[..n]);
    }
    Ok(acc.finalize())
}

/// Fail unless the file at `path` hashes to `expected`.
pub fn verify_file_digest(path: &Path, expected: &ContentDigest) -> Result<(), CryptoError> {
    let actual = file_digest(path)?;
    if !bool::from(actual.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(CryptoError::Store(format!(
            "integrity violation: {} has digest {} but manifest says {}",
            path.display(),
            actual,
            expected
        )));
    }
    Ok(())
}

fn copy_dir_all(from: &Path, to: &Path) -> Result<(), CryptoError> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn unique_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Durable home of compiled circuit artifacts, one directory per key.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base_dir: PathBuf,
}

impl ArtifactStore {
    /// The directory is created on first publish.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory an entry lives in once published.
    pub fn entry_dir(&self, kind: &str, signature: &str) -> Result<PathBuf, CryptoError> {
        let kind = validate_segment("kind", kind)?;
        let signature = validate_segment("signature", signature)?;
        Ok(self.base_dir.join(kind).join(signature))
    }

    /// Read a published entry's manifest. `Ok(None)` when the entry does
    /// not exist.
    pub fn read_manifest<T: DeserializeOwned>(
        &self,
        kind: &str,
        signature: &str,
    ) -> Result<Option<(PathBuf, T)>, CryptoError> {
        let dir = self.entry_dir(kind, signature)?;
        let path = dir.join(MANIFEST_FILE);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest = serde_json::from_slice(&bytes).map_err(|e| {
            CryptoError::Store(format!("manifest at {} is not valid: {e}", path.display()))
        })?;
        Ok(Some((dir, manifest)))
    }

    /// Atomically publish the fully written `staging` directory as the
    /// entry for `(kind, signature)`, replacing any existing entry.
    ///
    /// Returns the published directory.
    pub fn publish(&self, kind: &str, signature: &str, staging: &Path) -> Result<PathBuf, CryptoError> {
        let target = self.entry_dir(kind, signature)?;
        let kind_dir = self.base_dir.join(kind);
        fs::create_dir_all(&kind_dir)?;

        let incoming = kind_dir.join(format!(".incoming-{}", unique_suffix()));
        if let Err(e) = copy_dir_all(staging, &incoming) {
            let _ = fs::remove_dir_all(&incoming);
            return Err(e);
        }

        let mut displaced = None;
        if target.exists() {
            let stale = kind_dir.join(format!(".stale-{}", unique_suffix()));
            match fs::rename(&target, &stale) {
                Ok(()) => displaced = Some(stale),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    let _ = fs::remove_dir_all(&incoming);
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = fs::rename(&incoming, &target) {
            let _ = fs::remove_dir_all(&incoming);
            // Another process published the same key between our rename
            // aside and now; its entry is as good as ours.
            if target.join(MANIFEST_FILE).exists() {
                tracing::debug!(path = %target.display(), "artifact published concurrently");
            } else {
                return Err(e.into());
            }
        }

        if let Some(stale) = displaced {
            if let Err(e) = fs::remove_dir_all(&stale) {
                tracing::warn!(path = %stale.display(), error = %e, "failed to remove displaced artifact");
            }
        }
        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// ProofRecordStore
// ---------------------------------------------------------------------------

/// Append-only audit log of generated proofs.
#[derive(Debug, Clone)]
pub struct ProofRecordStore {
    base_dir: PathBuf,
}

impl ProofRecordStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Persist one record. Returns its path.
    pub fn store(&self, kind: &str, signature: &str, record: &impl Serialize) -> Result<PathBuf, CryptoError> {
        let kind = validate_segment("kind", kind)?;
        let signature = validate_segment("signature", signature)?;
        let dir = self.base_dir.join(kind);
        fs::create_dir_all(&dir)?;

        let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let random = &unique_suffix()[..12];
        let name = format!("{timestamp}_{random}_{signature}.json");
        let path = dir.join(&name);
        let tmp = dir.join(format!(".{name}.tmp"));

        let bytes = serde_json::to_vec_pretty(record)?;
        let written = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .and_then(|mut f| {
                f.write_all(&bytes)?;
                f.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(path)
    }

    /// Record paths for `kind`, oldest first.
    pub fn list(&self, kind: &str) -> Result<Vec<PathBuf>, CryptoError> {
        let dir = self.base_dir.join(validate_segment("kind", kind)?);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let visible = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('.') && n.ends_with(".json"));
            if visible {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T, CryptoError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

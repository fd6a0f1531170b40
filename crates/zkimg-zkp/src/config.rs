//! Prover configuration.
//!
//! Defaults suit a local development checkout. Override via `ZKIMG_*`
//! environment variables, a YAML document (see `zkimg-chain`'s
//! `ServiceConfig`) or explicit construction.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;
use crate::policy::{PolicyMode, ProofPolicy, POLICY_ENV};

/// Settings for the artifact cache and proof engine.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    /// Persistent artifact store.
    pub artifact_dir: PathBuf,
    /// Scratch space for staging compilations.
    pub work_dir: PathBuf,
    /// Powers-of-tau file.
    pub setup_path: PathBuf,
    /// Largest width or height one circuit may witness.
    pub max_dimension: u32,
    pub max_resident_artifacts: usize,
    pub compile_timeout_secs: u64,
    pub prove_timeout_secs: u64,
    /// Where proof audit records go. `None` disables them.
    pub proof_records_dir: Option<PathBuf>,
    /// `None` falls back to `ZKIMG_PROOF_POLICY`, then the build default.
    pub proof_policy: Option<PolicyMode>,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("zkimg-data/artifacts"),
            work_dir: PathBuf::from("zkimg-data/work"),
            setup_path: PathBuf::from("zkimg-data/pot_final.ptau"),
            max_dimension: 1024,
            max_resident_artifacts: 64,
            compile_timeout_secs: 600,
            prove_timeout_secs: 300,
            proof_records_dir: None,
            proof_policy: None,
        }
    }
}

impl std::fmt::Debug for ProverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProverConfig")
            .field("artifact_dir", &self.artifact_dir.display())
            .field("work_dir", &self.work_dir.display())
            .field("setup_path", &self.setup_path.display())
            .field("max_dimension", &self.max_dimension)
            .field("max_resident_artifacts", &self.max_resident_artifacts)
            .field("compile_timeout_secs", &self.compile_timeout_secs)
            .field("prove_timeout_secs", &self.prove_timeout_secs)
            .field("proof_records_dir", &self.proof_records_dir.as_ref().map(|p| p.display()))
            .field("proof_policy", &self.proof_policy)
            .finish()
    }
}

impl ProverConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `ZKIMG_ARTIFACT_DIR` (default: `zkimg-data/artifacts`)
    /// - `ZKIMG_WORK_DIR` (default: `zkimg-data/work`)
    /// - `ZKIMG_SETUP_PATH` (default: `zkimg-data/pot_final.ptau`)
    /// - `ZKIMG_MAX_DIMENSION` (default: 1024)
    /// - `ZKIMG_MAX_RESIDENT_ARTIFACTS` (default: 64)
    /// - `ZKIMG_COMPILE_TIMEOUT_SECS` (default: 600)
    /// - `ZKIMG_PROVE_TIMEOUT_SECS` (default: 300)
    /// - `ZKIMG_PROOF_RECORDS_DIR` (default: unset, no records)
    /// - `ZKIMG_PROOF_POLICY` (`production` / `development`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(&|name| std::env::var(name).ok())
    }

    /// Apply every variable `lookup` knows on top of `self`.
    pub fn with_overrides(mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("ZKIMG_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ZKIMG_WORK_DIR") {
            self.work_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ZKIMG_SETUP_PATH") {
            self.setup_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ZKIMG_PROOF_RECORDS_DIR") {
            self.proof_records_dir = Some(PathBuf::from(v));
        }
        parse_override(lookup, "ZKIMG_MAX_DIMENSION", &mut self.max_dimension)?;
        parse_override(lookup, "ZKIMG_MAX_RESIDENT_ARTIFACTS", &mut self.max_resident_artifacts)?;
        parse_override(lookup, "ZKIMG_COMPILE_TIMEOUT_SECS", &mut self.compile_timeout_secs)?;
        parse_override(lookup, "ZKIMG_PROVE_TIMEOUT_SECS", &mut self.prove_timeout_secs)?;
        if let Some(v) = lookup(POLICY_ENV) {
            let mode = PolicyMode::parse(&v).ok_or_else(|| ConfigError::Invalid {
                var: POLICY_ENV.to_string(),
                reason: format!("expected production or development, got {v:?}"),
            })?;
            self.proof_policy = Some(mode);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings no deployment can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("ZKIMG_MAX_DIMENSION", self.max_dimension as u64),
            ("ZKIMG_MAX_RESIDENT_ARTIFACTS", self.max_resident_artifacts as u64),
            ("ZKIMG_COMPILE_TIMEOUT_SECS", self.compile_timeout_secs),
            ("ZKIMG_PROVE_TIMEOUT_SECS", self.prove_timeout_secs),
        ];
        for (var, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn prove_timeout(&self) -> Duration {
        Duration::from_secs(self.prove_timeout_secs)
    }

    pub fn policy(&self) -> ProofPolicy {
        match self.proof_policy {
            Some(mode) => ProofPolicy::new(mode),
            None => ProofPolicy::from_environment(),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            artifact_dir: self.artifact_dir.clone(),
            work_dir: self.work_dir.clone(),
            max_dimension: self.max_dimension,
            max_resident: self.max_resident_artifacts,
            compile_timeout: self.compile_timeout(),
        }
    }
}

/// Parse `var` into `slot` when `lookup` knows it. Leaves `slot` alone
/// otherwise.
pub fn parse_override<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    var: &str,
    slot: &mut T,
) -> Result<(), ConfigError>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(var) {
        *slot = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
    #[error("cannot read config file {path}: {reason}")]
    File { path: String, reason: String },
}

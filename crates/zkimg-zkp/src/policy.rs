//! # Proof Backend Policy
//!
//! Mock proofs bind public signals with SHA-256 and carry no cryptographic
//! soundness: anyone can mint one for any pair of commitments. A verifier in
//! a real deployment must refuse them. [`ProofPolicy`] is consulted by
//! [`ProofEngine::verify`](crate::engine::ProofEngine::verify) before any
//! backend verification runs.
//!
//! ## Configuration
//!
//! 1. `ZKIMG_PROOF_POLICY` (`production` / `development`)
//! 2. Otherwise release builds default to `Production`, debug builds to
//!    `Development`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::traits::BackendKind;

/// Environment variable selecting the policy mode.
pub const POLICY_ENV: &str = "ZKIMG_PROOF_POLICY";

/// Errors from proof policy enforcement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("mock proof rejected: production mode requires a real proof backend ({backend})")]
    MockProofRejected { backend: String },
}

/// Proof policy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Reject mock proofs unconditionally.
    Production,
    /// Accept mock proofs (tests and local development only).
    Development,
}

impl PolicyMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "development" | "dev" => Some(Self::Development),
            _ => None,
        }
    }

    /// Compile-time default: release = production, debug = development.
    pub fn build_default() -> Self {
        if cfg!(not(debug_assertions)) {
            Self::Production
        } else {
            Self::Development
        }
    }
}

/// Whether a proof backend is acceptable in the current deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofPolicy {
    mode: PolicyMode,
}

impl ProofPolicy {
    pub fn new(mode: PolicyMode) -> Self {
        Self { mode }
    }

    pub fn production() -> Self {
        Self::new(PolicyMode::Production)
    }

    pub fn development() -> Self {
        Self::new(PolicyMode::Development)
    }

    /// `ZKIMG_PROOF_POLICY`, falling back to the build default.
    pub fn from_environment() -> Self {
        let mode = std::env::var(POLICY_ENV)
            .ok()
            .and_then(|v| PolicyMode::parse(&v))
            .unwrap_or_else(PolicyMode::build_default);
        Self::new(mode)
    }

    pub fn validate(&self, backend: BackendKind) -> Result<(), PolicyError> {
        match self.mode {
            PolicyMode::Production if !backend.is_real() => Err(PolicyError::MockProofRejected {
                backend: backend.name().to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }
}

//! # Service Configuration
//!
//! [`ServiceConfig`] wraps the prover settings and adds tiling, chain and
//! backend selection. Sources, lowest precedence first:
//!
//! 1. built-in defaults;
//! 2. a YAML document ([`ServiceConfig::from_yaml_file`]);
//! 3. `ZKIMG_*` environment variables.
//!
//! ```yaml
//! prover:
//!   artifact_dir: /var/lib/zkimg/artifacts
//!   setup_path: /var/lib/zkimg/pot_final.ptau
//!   max_dimension: 1024
//! tile_size: 256
//! backend:
//!   kind: snarkjs
//!   protocol: groth16
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zkimg_zkp::{parse_override, ConfigError, ProverConfig, SnarkProtocol, SnarkjsConfig};

use crate::recursion::DEFAULT_MAX_CHAIN_DEPTH;
use crate::tiling::{TileSettings, DEFAULT_MAX_TILES, DEFAULT_TILE_SIZE, DEFAULT_TILE_WORKERS};

/// Which proving backend the service drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Deterministic test double. Rejected under a production policy.
    Mock,
    /// `circom` + `snarkjs` child processes.
    Snarkjs(SnarkjsConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Snarkjs(SnarkjsConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub prover: ProverConfig,
    /// Tile edge length. Must be below `prover.max_dimension` so a tile
    /// plus its resize halo still fits one circuit.
    pub tile_size: u32,
    pub tile_workers: usize,
    pub max_tiles: usize,
    pub max_chain_depth: u32,
    /// Idle time after which an open chain is dropped.
    pub chain_ttl_secs: u64,
    pub max_open_chains: usize,
    pub backend: BackendConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            prover: ProverConfig::default(),
            tile_size: DEFAULT_TILE_SIZE,
            tile_workers: DEFAULT_TILE_WORKERS,
            max_tiles: DEFAULT_MAX_TILES,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            chain_ttl_secs: 3600,
            max_open_chains: 1024,
            backend: BackendConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Defaults plus environment overrides.
    ///
    /// Variables, beyond those of [`ProverConfig::from_env`]:
    /// - `ZKIMG_TILE_SIZE` (default: 256)
    /// - `ZKIMG_TILE_WORKERS` (default: 4)
    /// - `ZKIMG_MAX_TILES` (default: 4096)
    /// - `ZKIMG_MAX_CHAIN_DEPTH` (default: 100)
    /// - `ZKIMG_CHAIN_TTL_SECS` (default: 3600)
    /// - `ZKIMG_MAX_OPEN_CHAINS` (default: 1024)
    /// - `ZKIMG_BACKEND` (`snarkjs` / `mock`, default: `snarkjs`)
    /// - `ZKIMG_CIRCOM_BIN`, `ZKIMG_SNARKJS_BIN`, `ZKIMG_CIRCUITS_DIR`,
    ///   `ZKIMG_SNARK_PROTOCOL` (`groth16` / `plonk`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(&|name| std::env::var(name).ok())
    }

    /// Read a YAML document, then apply environment overrides.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|e| file_error(e.to_string()))?;
        config.with_overrides(&|name| std::env::var(name).ok())
    }

    pub fn with_overrides(mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        self.prover = self.prover.with_overrides(lookup)?;
        parse_override(lookup, "ZKIMG_TILE_SIZE", &mut self.tile_size)?;
        parse_override(lookup, "ZKIMG_TILE_WORKERS", &mut self.tile_workers)?;
        parse_override(lookup, "ZKIMG_MAX_TILES", &mut self.max_tiles)?;
        parse_override(lookup, "ZKIMG_MAX_CHAIN_DEPTH", &mut self.max_chain_depth)?;
        parse_override(lookup, "ZKIMG_CHAIN_TTL_SECS", &mut self.chain_ttl_secs)?;
        parse_override(lookup, "ZKIMG_MAX_OPEN_CHAINS", &mut self.max_open_chains)?;

        if let Some(kind) = lookup("ZKIMG_BACKEND") {
            self.backend = match kind.trim() {
                "mock" => BackendConfig::Mock,
                "snarkjs" => match self.backend {
                    BackendConfig::Snarkjs(existing) => BackendConfig::Snarkjs(existing),
                    BackendConfig::Mock => BackendConfig::Snarkjs(SnarkjsConfig::default()),
                },
                other => {
                    return Err(ConfigError::Invalid {
                        var: "ZKIMG_BACKEND".to_string(),
                        reason: format!("expected snarkjs or mock, got {other:?}"),
                    })
                }
            };
        }
        if let BackendConfig::Snarkjs(snarkjs) = &mut self.backend {
            if let Some(v) = lookup("ZKIMG_CIRCOM_BIN") {
                snarkjs.circom_bin = PathBuf::from(v);
            }
            if let Some(v) = lookup("ZKIMG_SNARKJS_BIN") {
                snarkjs.snarkjs_bin = PathBuf::from(v);
            }
            if let Some(v) = lookup("ZKIMG_CIRCUITS_DIR") {
                snarkjs.circuits_dir = PathBuf::from(v);
            }
            if let Some(v) = lookup("ZKIMG_SNARK_PROTOCOL") {
                snarkjs.protocol = SnarkProtocol::parse(v.trim()).ok_or_else(|| ConfigError::Invalid {
                    var: "ZKIMG_SNARK_PROTOCOL".to_string(),
                    reason: format!("expected groth16 or plonk, got {v:?}"),
                })?;
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prover.validate()?;
        let invalid = |var: &str, reason: String| ConfigError::Invalid {
            var: var.to_string(),
            reason,
        };
        if self.tile_size == 0 || self.tile_size >= self.prover.max_dimension {
            return Err(invalid(
                "ZKIMG_TILE_SIZE",
                format!(
                    "must be between 1 and {} (below ZKIMG_MAX_DIMENSION), got {}",
                    self.prover.max_dimension.saturating_sub(1),
                    self.tile_size
                ),
            ));
        }
        let positive = [
            ("ZKIMG_TILE_WORKERS", self.tile_workers as u64),
            ("ZKIMG_MAX_TILES", self.max_tiles as u64),
            ("ZKIMG_CHAIN_TTL_SECS", self.chain_ttl_secs),
            ("ZKIMG_MAX_OPEN_CHAINS", self.max_open_chains as u64),
        ];
        for (var, value) in positive {
            if value == 0 {
                return Err(invalid(var, "must be greater than zero".to_string()));
            }
        }
        Ok(())
    }

    pub fn chain_ttl(&self) -> Duration {
        Duration::from_secs(self.chain_ttl_secs)
    }

    pub fn tile_settings(&self) -> TileSettings {
        TileSettings {
            tile_size: self.tile_size,
            workers: self.tile_workers,
            max_tiles: self.max_tiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = ServiceConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.tile_size, 256);
        assert_eq!(cfg.max_chain_depth, 100);
        assert_eq!(cfg.chain_ttl(), Duration::from_secs(3600));
        assert!(matches!(cfg.backend, BackendConfig::Snarkjs(_)));
    }

    #[test]
    fn environment_selects_mock_backend() {
        let cfg = ServiceConfig::default()
            .with_overrides(&lookup(&[("ZKIMG_BACKEND", "mock"), ("ZKIMG_TILE_WORKERS", "8")]))
            .unwrap();
        assert_eq!(cfg.backend, BackendConfig::Mock);
        assert_eq!(cfg.tile_settings().workers, 8);
    }

    #[test]
    fn snarkjs_paths_and_protocol_override() {
        let cfg = ServiceConfig::default()
            .with_overrides(&lookup(&[
                ("ZKIMG_SNARKJS_BIN", "/opt/snarkjs/cli.js"),
                ("ZKIMG_SNARK_PROTOCOL", "plonk"),
            ]))
            .unwrap();
        let BackendConfig::Snarkjs(snarkjs) = cfg.backend else {
            panic!("expected snarkjs backend");
        };
        assert_eq!(snarkjs.snarkjs_bin, PathBuf::from("/opt/snarkjs/cli.js"));
        assert_eq!(snarkjs.protocol, SnarkProtocol::Plonk);
    }

    #[test]
    fn tile_must_fit_below_dimension_limit() {
        let err = ServiceConfig::default()
            .with_overrides(&lookup(&[("ZKIMG_MAX_DIMENSION", "256")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "ZKIMG_TILE_SIZE"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = ServiceConfig::default()
            .with_overrides(&lookup(&[("ZKIMG_BACKEND", "halo2")]))
            .unwrap_err();
        assert!(format!("{err}").contains("ZKIMG_BACKEND"));
    }

    #[test]
    fn yaml_document_is_layered_on_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("zkimg.yaml");
        std::fs::write(
            &path,
            "prover:\n  max_dimension: 512\ntile_size: 128\nbackend:\n  kind: mock\n",
        )
        .unwrap();
        let cfg = ServiceConfig::from_yaml_file(&path).unwrap();
        assert_eq!(cfg.prover.max_dimension, 512);
        assert_eq!(cfg.prover.prove_timeout_secs, 300);
        assert_eq!(cfg.tile_size, 128);
        assert_eq!(cfg.backend, BackendConfig::Mock);
    }

    #[test]
    fn missing_yaml_file_names_the_path() {
        let err = ServiceConfig::from_yaml_file(Path::new("/nonexistent/zkimg.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::File { ref path, .. } if path.contains("zkimg.yaml")));
    }
}

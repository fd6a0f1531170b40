//! # snarkjs Proving Backend
//!
//! Production backend. Circuits are the templates under the repository's
//! `circuits/` directory, instantiated per [`CircuitShape`] and driven
//! through two external tools:
//!
//! - `circom` compiles `main.circom` to R1CS plus a WASM witness generator.
//! - `snarkjs` derives keys from the trusted setup (`groth16 setup` or
//!   `plonk setup`), proves with `fullprove` and verifies.
//!
//! Every child process runs under the caller's [`Deadline`] and is killed
//! if still running when it passes. Tool output goes to log files in the
//! working directory, never to our own stdout.
//!
//! ## Witness encoding
//!
//! `input.json` carries flat, row-major, channel-interleaved arrays `pre`
//! and `post`, and for resize and grayscale the remainder arrays `pos_rem`
//! and `neg_rem` in the order [`AuxValues`](crate::circuits::AuxValues)
//! stores them. The file lives in a private temporary directory that is
//! removed as soon as the prover exits.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use zkimg_core::Deadline;

use crate::artifact::{ArtifactSet, VerificationKey, CONSTRAINT_SYSTEM_FILE, PROVING_KEY_FILE, VERIFICATION_KEY_FILE};
use crate::circuits::CircuitShape;
use crate::engine::PublicSignals;
use crate::error::{CompilationError, ProofGenerationError, VerifyError};
use crate::traits::{BackendKind, CompileOutput, CompileRequest, ProvingBackend};
use crate::witness::Witness;

/// Name of the generated top-level circuit.
const MAIN: &str = "main";
const POLL: Duration = Duration::from_millis(20);

/// SNARK protocol snarkjs should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnarkProtocol {
    #[default]
    Groth16,
    Plonk,
}

impl SnarkProtocol {
    fn command(self) -> &'static str {
        match self {
            Self::Groth16 => "groth16",
            Self::Plonk => "plonk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groth16" => Some(Self::Groth16),
            "plonk" => Some(Self::Plonk),
            _ => None,
        }
    }
}

/// Tool locations and protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnarkjsConfig {
    pub circom_bin: PathBuf,
    pub snarkjs_bin: PathBuf,
    /// Directory holding `crop.circom`, `resize.circom`, `grayscale.circom`
    /// and their shared `image_hash.circom` and `rounding.circom`.
    pub circuits_dir: PathBuf,
    /// Extra `-l` include paths, typically circomlib's `circuits/`.
    pub include_dirs: Vec<PathBuf>,
    pub protocol: SnarkProtocol,
    /// Verification has no caller deadline; this bounds it.
    pub verify_timeout_secs: u64,
}

impl Default for SnarkjsConfig {
    fn default() -> Self {
        Self {
            circom_bin: PathBuf::from("circom"),
            snarkjs_bin: PathBuf::from("snarkjs"),
            circuits_dir: PathBuf::from("circuits"),
            include_dirs: vec![PathBuf::from("node_modules/circomlib/circuits")],
            protocol: SnarkProtocol::Groth16,
            verify_timeout_secs: 60,
        }
    }
}

/// Drives `circom` and `snarkjs` as child processes.
#[derive(Debug, Clone)]
pub struct SnarkjsBackend {
    config: SnarkjsConfig,
}

impl SnarkjsBackend {
    pub fn new(config: SnarkjsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SnarkjsConfig {
        &self.config
    }

    fn snarkjs(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.config.snarkjs_bin);
        cmd.current_dir(dir);
        cmd
    }
}

/// `main.circom` instantiating the template for `shape`.
pub fn main_circuit(shape: &CircuitShape) -> String {
    let (include, component) = match shape {
        CircuitShape::Crop(s) => (
            "crop.circom",
            format!(
                "Crop({}, {}, {}, {}, {}, {}, {})",
                s.orig.height,
                s.orig.width,
                s.new.height,
                s.new.width,
                s.start_y,
                s.start_x,
                s.color.channels()
            ),
        ),
        CircuitShape::Resize(s) => (
            "resize.circom",
            format!(
                "Resize({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
                s.window.height,
                s.window.width,
                s.out.height,
                s.out.width,
                s.color.channels(),
                s.src.height,
                s.src.width,
                s.dst.height,
                s.dst.width,
                s.window.y,
                s.window.x,
                s.out.y,
                s.out.x
            ),
        ),
        CircuitShape::Grayscale(s) => (
            "grayscale.circom",
            format!("Grayscale({}, {})", s.dims.height, s.dims.width),
        ),
    };
    format!("pragma circom 2.1.6;\n\ninclude \"{include}\";\n\ncomponent main = {component};\n")
}

/// `input.json` for a witness.
fn witness_input(witness: &Witness) -> serde_json::Value {
    let mut input = json!({
        "pre": witness.pre().data(),
        "post": witness.post().data(),
    });
    if !matches!(witness.shape(), CircuitShape::Crop(_)) {
        input["pos_rem"] = json!(witness.aux().pos_rem());
        input["neg_rem"] = json!(witness.aux().neg_rem());
    }
    input
}

// ---------------------------------------------------------------------------
// Child processes
// ---------------------------------------------------------------------------

enum RunError {
    Spawn(std::io::Error),
    Failed { status: ExitStatus, log: String },
    Timeout,
}

impl RunError {
    fn describe(&self) -> String {
        match self {
            Self::Spawn(e) => format!("could not start: {e}"),
            Self::Failed { status, log } => format!("{status}: {}", tail(log, 2000)),
            Self::Timeout => "deadline passed".to_string(),
        }
    }
}

fn tail(s: &str, max: usize) -> &str {
    let start = s.len().saturating_sub(max);
    let start = (start..s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len());
    s[start..].trim()
}

/// Run `cmd` to completion with output captured to `<log_dir>/<stage>.log`,
/// killing it once `deadline` passes. Returns the captured output.
fn run(mut cmd: Command, stage: &str, log_dir: &Path, deadline: Deadline) -> Result<String, RunError> {
    let log_path = log_dir.join(format!("{stage}.log"));
    let log = File::create(&log_path).map_err(RunError::Spawn)?;
    let err = log.try_clone().map_err(RunError::Spawn)?;
    cmd.stdin(Stdio::null()).stdout(Stdio::from(log)).stderr(Stdio::from(err));

    tracing::debug!(stage, command = ?cmd, "running");
    let mut child = cmd.spawn().map_err(RunError::Spawn)?;
    let status = loop {
        match child.try_wait().map_err(RunError::Spawn)? {
            Some(status) => break status,
            None if deadline.expired() => {
                if let Err(e) = child.kill() {
                    tracing::warn!(stage, error = %e, "failed to kill child process");
                }
                let _ = child.wait();
                return Err(RunError::Timeout);
            }
            None => std::thread::sleep(POLL),
        }
    };
    let output = std::fs::read_to_string(&log_path).unwrap_or_default();
    if status.success() {
        Ok(output)
    } else {
        Err(RunError::Failed { status, log: output })
    }
}

fn compile_error(stage: &str, e: RunError) -> CompilationError {
    match e {
        RunError::Timeout => CompilationError::Timeout,
        other => CompilationError::Backend {
            stage: stage.to_string(),
            message: other.describe(),
        },
    }
}

/// Sum the constraint counts circom prints.
fn parse_constraint_count(circom_output: &str) -> Option<u64> {
    let mut total = None;
    for line in circom_output.lines() {
        let lower = line.to_ascii_lowercase();
        if lower.contains("non-linear constraints") || lower.starts_with("linear constraints") {
            let n = line.rsplit(':').next()?.trim().parse::<u64>().ok()?;
            total = Some(total.unwrap_or(0) + n);
        }
    }
    total
}

impl ProvingBackend for SnarkjsBackend {
    fn kind(&self) -> BackendKind {
        match self.config.protocol {
            SnarkProtocol::Groth16 => BackendKind::Groth16,
            SnarkProtocol::Plonk => BackendKind::Plonk,
        }
    }

    fn compile(
        &self,
        request: &CompileRequest<'_>,
        deadline: Deadline,
    ) -> Result<CompileOutput, CompilationError> {
        let out = request.out_dir;
        let io = |e: std::io::Error| CompilationError::Io(e.to_string());
        let main = out.join(format!("{MAIN}.circom"));
        std::fs::write(&main, main_circuit(request.shape)).map_err(io)?;

        let mut circom = Command::new(&self.config.circom_bin);
        circom
            .current_dir(out)
            .arg(&main)
            .args(["--r1cs", "--wasm", "-o"])
            .arg(out)
            .arg("-l")
            .arg(&self.config.circuits_dir);
        for dir in &self.config.include_dirs {
            circom.arg("-l").arg(dir);
        }
        let circom_log = run(circom, "circom", out, deadline).map_err(|e| compile_error("circom", e))?;
        std::fs::rename(out.join(format!("{MAIN}.r1cs")), out.join(CONSTRAINT_SYSTEM_FILE)).map_err(io)?;

        let protocol = self.config.protocol.command();
        let mut setup = self.snarkjs(out);
        setup
            .args([protocol, "setup", CONSTRAINT_SYSTEM_FILE])
            .arg(request.setup.path())
            .arg(PROVING_KEY_FILE);
        run(setup, "setup", out, deadline).map_err(|e| compile_error("snarkjs setup", e))?;

        let mut export = self.snarkjs(out);
        export.args(["zkey", "export", "verificationkey", PROVING_KEY_FILE, VERIFICATION_KEY_FILE]);
        run(export, "export", out, deadline).map_err(|e| compile_error("snarkjs export", e))?;

        let constraint_count = parse_constraint_count(&circom_log).unwrap_or_else(|| {
            tracing::warn!(circuit = %request.key, "circom did not report a constraint count");
            request.shape.estimated_constraints()
        });
        Ok(CompileOutput { constraint_count })
    }

    fn prove(
        &self,
        artifact: &ArtifactSet,
        witness: &Witness,
        deadline: Deadline,
    ) -> Result<Vec<u8>, ProofGenerationError> {
        witness
            .shape()
            .check(witness.pre(), witness.post(), witness.aux(), deadline)?;

        let backend = |e: &dyn std::fmt::Display| ProofGenerationError::Backend(e.to_string());
        let scratch = tempfile::Builder::new()
            .prefix(".prove-")
            .tempdir()
            .map_err(|e| backend(&e))?;
        let dir = scratch.path();
        let input = serde_json::to_vec(&witness_input(witness)).map_err(|e| backend(&e))?;
        std::fs::write(dir.join("input.json"), input).map_err(|e| backend(&e))?;

        let wasm = artifact.dir().join(format!("{MAIN}_js")).join(format!("{MAIN}.wasm"));
        let mut cmd = self.snarkjs(dir);
        cmd.args([self.config.protocol.command(), "fullprove", "input.json"])
            .arg(wasm)
            .arg(artifact.dir().join(PROVING_KEY_FILE))
            .args(["proof.json", "public.json"]);
        run(cmd, "fullprove", dir, deadline).map_err(|e| match e {
            RunError::Timeout => ProofGenerationError::Timeout,
            other => ProofGenerationError::Backend(format!("snarkjs fullprove: {}", other.describe())),
        })?;

        let public: Vec<String> = serde_json::from_slice(
            &std::fs::read(dir.join("public.json")).map_err(|e| backend(&e))?,
        )
        .map_err(|e| backend(&e))?;
        let expected = witness.public_signals();
        if public.as_slice() != expected.as_slice() {
            return Err(ProofGenerationError::PublicSignalMismatch(format!(
                "prover emitted {} signals that differ from the witness commitments",
                public.len()
            )));
        }
        std::fs::read(dir.join("proof.json")).map_err(|e| backend(&e))
    }

    fn verify(
        &self,
        vk: &VerificationKey,
        proof: &[u8],
        public_signals: &PublicSignals,
    ) -> Result<bool, VerifyError> {
        if serde_json::from_slice::<serde_json::Value>(proof).is_err() {
            return Err(VerifyError::MalformedProof("proof is not a snarkjs JSON proof".to_string()));
        }
        let backend = |e: &dyn std::fmt::Display| VerifyError::Backend(e.to_string());
        let scratch = tempfile::Builder::new()
            .prefix(".verify-")
            .tempdir()
            .map_err(|e| backend(&e))?;
        let dir = scratch.path();
        std::fs::write(dir.join(VERIFICATION_KEY_FILE), vk.bytes()).map_err(|e| backend(&e))?;
        std::fs::write(dir.join("proof.json"), proof).map_err(|e| backend(&e))?;
        let signals = serde_json::to_vec(public_signals).map_err(|e| backend(&e))?;
        std::fs::write(dir.join("public.json"), signals).map_err(|e| backend(&e))?;

        let mut cmd = self.snarkjs(dir);
        cmd.args([
            self.config.protocol.command(),
            "verify",
            VERIFICATION_KEY_FILE,
            "public.json",
            "proof.json",
        ]);
        let deadline = Deadline::after(Duration::from_secs(self.config.verify_timeout_secs));
        match run(cmd, "verify", dir, deadline) {
            Ok(output) => Ok(output.contains("OK")),
            Err(RunError::Failed { .. }) => Ok(false),
            Err(e) => Err(VerifyError::Backend(format!("snarkjs verify: {}", e.describe()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkimg_core::{ColorSpace, Dimensions, Transformation};

    #[test]
    fn main_circuit_instantiates_template() {
        let shape = CircuitShape::for_transformation(
            &Transformation::Crop {
                x: 2,
                y: 3,
                width: 4,
                height: 5,
            },
            Dimensions::new(10, 12),
            ColorSpace::Rgb,
        )
        .unwrap();
        let src = main_circuit(&shape);
        assert!(src.contains("include \"crop.circom\";"));
        assert!(src.contains("component main = Crop(12, 10, 5, 4, 3, 2, 3);"));
    }

    #[test]
    fn resize_template_receives_region_parameters() {
        let shape = CircuitShape::for_transformation(
            &Transformation::Resize { width: 4, height: 2 },
            Dimensions::new(8, 6),
            ColorSpace::Gray,
        )
        .unwrap();
        assert!(main_circuit(&shape).contains("Resize(6, 8, 2, 4, 1, 6, 8, 2, 4, 0, 0, 0, 0)"));
    }

    #[test]
    fn constraint_count_is_parsed_from_circom_output() {
        let log = "template instances: 12\nnon-linear constraints: 1200\nlinear constraints: 34\npublic inputs: 0\n";
        assert_eq!(parse_constraint_count(log), Some(1234));
        assert_eq!(parse_constraint_count("nothing here"), None);
    }

    #[test]
    fn protocol_selects_backend_kind() {
        let plonk = SnarkjsBackend::new(SnarkjsConfig {
            protocol: SnarkProtocol::Plonk,
            ..SnarkjsConfig::default()
        });
        assert_eq!(plonk.kind(), BackendKind::Plonk);
        assert_eq!(SnarkjsBackend::new(SnarkjsConfig::default()).kind(), BackendKind::Groth16);
        assert_eq!(SnarkProtocol::parse("PLONK"), Some(SnarkProtocol::Plonk));
    }

    #[test]
    fn missing_tool_is_a_backend_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let cmd = Command::new(tmp.path().join("no-such-binary"));
        let err = run(cmd, "probe", tmp.path(), Deadline::none()).unwrap_err();
        assert!(matches!(compile_error("probe", err), CompilationError::Backend { .. }));
    }

    #[test]
    fn garbage_proof_is_malformed() {
        let backend = SnarkjsBackend::new(SnarkjsConfig::default());
        let shape = CircuitShape::for_transformation(&Transformation::Grayscale, Dimensions::new(1, 1), ColorSpace::Rgb)
            .unwrap();
        let vk = VerificationKey::new(BackendKind::Groth16, shape.key().unwrap(), b"{}".to_vec());
        let signals = PublicSignals::from_raw(vec!["1".into(), "2".into()]);
        assert!(matches!(
            backend.verify(&vk, b"\x00\x01", &signals),
            Err(VerifyError::MalformedProof(_))
        ));
    }
}

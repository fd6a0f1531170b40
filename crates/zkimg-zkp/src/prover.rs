//! # Prover
//!
//! The cache and the engine behind one handle: resolve a circuit shape to
//! artifacts, build the witness, prove, and verify against keys the cache
//! already knows.
//!
//! Verification never compiles. A proof for a circuit this prover has never
//! compiled (and cannot find in its store) is rejected with a diagnostic.

use std::sync::Arc;
use std::time::Duration;

use zkimg_core::{ColorSpace, Deadline, Dimensions, PixelMatrix, Transformation};
use zkimg_crypto::{FieldElement, ProofRecordStore};

use crate::artifact::TrustedSetup;
use crate::cache::ArtifactCache;
use crate::circuits::CircuitShape;
use crate::config::ProverConfig;
use crate::engine::{ProofEngine, Proof, PublicSignals, VerificationOutcome};
use crate::error::{ProverError, SetupError};
use crate::traits::ProvingBackend;
use crate::witness::Witness;

/// Shape-to-proof pipeline over a shared [`ArtifactCache`].
pub struct Prover<B: ProvingBackend> {
    cache: ArtifactCache<B>,
    engine: Arc<ProofEngine<B>>,
    prove_timeout: Duration,
}

impl<B: ProvingBackend> Clone for Prover<B> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            engine: self.engine.clone(),
            prove_timeout: self.prove_timeout,
        }
    }
}

impl<B: ProvingBackend> std::fmt::Debug for Prover<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prover")
            .field("backend", &self.engine.backend().kind())
            .field("policy", &self.engine.policy())
            .field("prove_timeout", &self.prove_timeout)
            .finish()
    }
}

impl<B: ProvingBackend> Prover<B> {
    /// Load the trusted setup and open the artifact store.
    ///
    /// # Errors
    ///
    /// [`SetupError`] when the setup file is missing or unreadable, or a
    /// working directory cannot be created.
    pub fn new(config: &ProverConfig, backend: Arc<B>) -> Result<Self, SetupError> {
        let setup = TrustedSetup::load(&config.setup_path)?;
        let cache = ArtifactCache::new(backend.clone(), setup, config.cache_settings())?;
        let mut engine = ProofEngine::new(backend, config.policy());
        if let Some(dir) = &config.proof_records_dir {
            engine = engine.with_records(ProofRecordStore::new(dir));
        }
        tracing::info!(
            backend = %engine.backend().kind(),
            policy = ?engine.policy().mode(),
            artifact_dir = %config.artifact_dir.display(),
            max_dimension = config.max_dimension,
            "prover ready"
        );
        Ok(Self::from_parts(cache, engine, config.prove_timeout()))
    }

    pub fn from_parts(cache: ArtifactCache<B>, engine: ProofEngine<B>, prove_timeout: Duration) -> Self {
        Self {
            cache,
            engine: Arc::new(engine),
            prove_timeout,
        }
    }

    pub fn cache(&self) -> &ArtifactCache<B> {
        &self.cache
    }

    pub fn engine(&self) -> &ProofEngine<B> {
        &self.engine
    }

    /// Largest width or height one circuit accepts.
    pub fn max_dimension(&self) -> u32 {
        self.cache.settings().max_dimension
    }

    /// The configured proving timeout, starting now.
    pub fn default_deadline(&self) -> Deadline {
        Deadline::after(self.prove_timeout)
    }

    /// Resolve the whole-image circuit for applying `t` to an image of the
    /// given shape, enforcing the dimension limit.
    pub fn shape_for(
        &self,
        t: &Transformation,
        dims: Dimensions,
        color: ColorSpace,
    ) -> Result<CircuitShape, ProverError> {
        let shape = CircuitShape::for_transformation(t, dims, color)?;
        shape.check_limits(self.max_dimension())?;
        Ok(shape)
    }

    /// Prove that `post` is `shape` applied to `pre`.
    ///
    /// Both images are consumed: they become the witness and are zeroized
    /// when proving ends.
    ///
    /// # Errors
    ///
    /// - [`ProverError::Input`] for a shape over the dimension limit. Nothing
    ///   is compiled.
    /// - [`ProverError::Proof`] for images that do not match the shape, or a
    ///   `post` that is not the transformation of `pre`.
    /// - [`ProverError::Cache`] when artifacts cannot be compiled in time.
    pub async fn prove(
        &self,
        shape: CircuitShape,
        pre: PixelMatrix,
        post: PixelMatrix,
        deadline: Deadline,
    ) -> Result<Proof, ProverError> {
        shape.check_limits(self.max_dimension())?;
        let witness = Witness::prepare(shape, pre, post)?;
        let artifact = self.cache.ensure_shape(shape, deadline).await?;
        Ok(self.engine.generate(artifact, witness, deadline).await?)
    }

    /// Check `proof` against its own public signals.
    pub fn verify(&self, proof: &Proof) -> VerificationOutcome {
        self.verify_signals(proof, proof.public_signals())
    }

    /// Check that `proof` attests exactly `input -> output`.
    pub fn verify_against(&self, proof: &Proof, input: &FieldElement, output: &FieldElement) -> VerificationOutcome {
        self.verify_signals(proof, &PublicSignals::from_commitments(input, output))
    }

    fn verify_signals(&self, proof: &Proof, expected: &PublicSignals) -> VerificationOutcome {
        match self.cache.verification_key(proof.circuit()) {
            Some(vk) => self.engine.verify(&vk, proof, expected),
            None => VerificationOutcome::rejected(format!(
                "no verification key available for circuit {}",
                proof.circuit()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProofGenerationError;
    use crate::mock::MockBackend;
    use crate::policy::PolicyMode;
    use proptest::prelude::*;
    use zkimg_core::InputError;

    fn config(root: &std::path::Path) -> ProverConfig {
        let ptau = root.join("pot.ptau");
        std::fs::write(&ptau, b"ceremony").unwrap();
        ProverConfig {
            artifact_dir: root.join("artifacts"),
            work_dir: root.join("work"),
            setup_path: ptau,
            max_dimension: 64,
            proof_records_dir: Some(root.join("records")),
            proof_policy: Some(PolicyMode::Development),
            ..ProverConfig::default()
        }
    }

    fn prover(root: &std::path::Path) -> Prover<MockBackend> {
        Prover::new(&config(root), Arc::new(MockBackend::new())).unwrap()
    }

    fn rgb(w: u32, h: u32) -> PixelMatrix {
        PixelMatrix::from_fn(w, h, ColorSpace::Rgb, |x, y, c| (x * 7 + y * 13 + c * 29) as u8)
    }

    async fn prove_transformation(p: &Prover<MockBackend>, pre: PixelMatrix, t: Transformation) -> (Proof, PixelMatrix) {
        let shape = p.shape_for(&t, pre.dims(), pre.color()).unwrap();
        let post = t.apply(&pre).unwrap();
        let proof = p.prove(shape, pre, post.clone(), Deadline::none()).await.unwrap();
        (proof, post)
    }

    #[test]
    fn missing_setup_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(tmp.path());
        cfg.setup_path = tmp.path().join("absent.ptau");
        let err = Prover::new(&cfg, Arc::new(MockBackend::new())).unwrap_err();
        assert!(matches!(err, SetupError::Missing { .. }));
    }

    #[tokio::test]
    async fn grayscale_proof_verifies_and_binds_commitments() {
        let tmp = tempfile::tempdir().unwrap();
        let p = prover(tmp.path());
        let pre = rgb(6, 5);
        let input = zkimg_crypto::image_commitment(&pre).unwrap();
        let (proof, post) = prove_transformation(&p, pre, Transformation::Grayscale).await;
        let output = zkimg_crypto::image_commitment(&post).unwrap();

        assert!(p.verify(&proof).is_valid());
        assert!(p.verify_against(&proof, &input, &output).is_valid());
        let swapped = p.verify_against(&proof, &output, &input);
        assert!(!swapped.is_valid());
        assert!(swapped.diagnostic.unwrap().contains("public signals"));
    }

    #[tokio::test]
    async fn proof_records_hold_signals_only() {
        let tmp = tempfile::tempdir().unwrap();
        let p = prover(tmp.path());
        let (proof, _) = prove_transformation(&p, rgb(4, 4), Transformation::Grayscale).await;
        let records = ProofRecordStore::new(tmp.path().join("records"));
        let files = records.list("grayscale").unwrap();
        assert_eq!(files.len(), 1);
        let raw = std::fs::read_to_string(&files[0]).unwrap();
        assert!(raw.contains(&proof.public_signals().as_slice()[0]));
        assert!(!raw.contains("data"));
    }

    #[tokio::test]
    async fn wrong_post_image_is_unsatisfiable() {
        let tmp = tempfile::tempdir().unwrap();
        let p = prover(tmp.path());
        let pre = rgb(4, 4);
        let t = Transformation::Crop { x: 1, y: 1, width: 2, height: 2 };
        let shape = p.shape_for(&t, pre.dims(), pre.color()).unwrap();
        let mut post = t.apply(&pre).unwrap();
        post.set_sample(1, 0, 2, post.sample(1, 0, 2).wrapping_add(1));
        let err = p.prove(shape, pre, post, Deadline::none()).await.unwrap_err();
        assert!(matches!(
            err,
            ProverError::Proof(ProofGenerationError::UnsatisfiedConstraint { x: 1, y: 0, channel: 2, .. })
        ));
    }

    #[tokio::test]
    async fn oversized_shape_never_compiles() {
        let tmp = tempfile::tempdir().unwrap();
        let p = prover(tmp.path());
        let err = p
            .shape_for(&Transformation::Resize { width: 65, height: 8 }, Dimensions::new(8, 8), ColorSpace::Rgb)
            .unwrap_err();
        assert!(matches!(
            err,
            ProverError::Input(InputError::DimensionLimitExceeded { ref bound, value: 65, limit: 64 }) if bound == "new_width"
        ));
        assert_eq!(p.cache().compilations(), 0);
    }

    #[tokio::test]
    async fn unknown_circuit_is_rejected_without_compiling() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let prover_a = prover(a.path());
        let (proof, _) = prove_transformation(&prover_a, rgb(4, 4), Transformation::Grayscale).await;

        let prover_b = prover(b.path());
        let outcome = prover_b.verify(&proof);
        assert!(!outcome.is_valid());
        assert!(outcome.diagnostic.unwrap().contains("no verification key"));
        assert_eq!(prover_b.cache().compilations(), 0);
    }

    #[tokio::test]
    async fn persisted_key_verifies_after_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let proof = {
            let p = prover(tmp.path());
            prove_transformation(&p, rgb(4, 4), Transformation::Grayscale).await.0
        };
        let restarted = prover(tmp.path());
        assert!(restarted.verify(&proof).is_valid());
        assert_eq!(restarted.cache().compilations(), 0);
    }

    #[tokio::test]
    async fn production_policy_rejects_mock_proofs() {
        let tmp = tempfile::tempdir().unwrap();
        let p = prover(tmp.path());
        let (proof, _) = prove_transformation(&p, rgb(4, 4), Transformation::Grayscale).await;

        let mut cfg = config(tmp.path());
        cfg.proof_policy = Some(PolicyMode::Production);
        let strict = Prover::new(&cfg, Arc::new(MockBackend::new())).unwrap();
        let outcome = strict.verify(&proof);
        assert!(!outcome.is_valid());
        assert!(outcome.diagnostic.unwrap().contains("production mode"));
    }

    #[tokio::test]
    async fn tampered_proof_bytes_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let p = prover(tmp.path());
        let (proof, _) = prove_transformation(&p, rgb(4, 4), Transformation::Grayscale).await;
        let mut bytes = proof.bytes().to_vec();
        bytes[0] ^= 1;
        let forged = Proof::new(
            proof.backend(),
            proof.circuit().clone(),
            *proof.verification_key_digest(),
            bytes,
            proof.public_signals().clone(),
        );
        assert!(!p.verify(&forged).is_valid());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn any_in_bounds_crop_verifies(
            (w, h, x, y, cw, ch) in (2u32..12, 2u32..12).prop_flat_map(|(w, h)| {
                (Just(w), Just(h), 0..w, 0..h).prop_flat_map(|(w, h, x, y)| {
                    (Just(w), Just(h), Just(x), Just(y), 1..=w - x, 1..=h - y)
                })
            })
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let tmp = tempfile::tempdir().unwrap();
            let p = prover(tmp.path());
            let t = Transformation::Crop { x, y, width: cw, height: ch };
            let (proof, _) = rt.block_on(prove_transformation(&p, rgb(w, h), t));
            prop_assert!(p.verify(&proof).is_valid());
        }
    }
}

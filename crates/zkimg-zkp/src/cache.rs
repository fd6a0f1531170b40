//! # Circuit Artifact Cache
//!
//! Resolves a circuit key to compiled artifacts, compiling at most once per
//! key no matter how many requests ask for it concurrently.
//!
//! ## Resolution order
//!
//! 1. Resident in memory: returned immediately.
//! 2. Compilation in flight: the caller joins it and receives the same
//!    result (success or failure) as every other waiter.
//! 3. Persisted in the [`ArtifactStore`] with a matching manifest and intact
//!    files: loaded without compiling.
//! 4. Otherwise compiled into a staging directory under `work_dir` and
//!    atomically published.
//!
//! ## Failure handling
//!
//! A compilation is bounded by the configured compile timeout, never by a
//! caller's deadline. A caller whose deadline passes stops waiting with
//! [`CacheError::Timeout`]; the compilation carries on for the remaining
//! waiters and keeps its key pending until it returns.
//!
//! A failed or timed-out compilation is logged once, delivered to every
//! waiter and then forgotten: the next request tries again. If publishing
//! fails the artifact is still served from its staging directory and
//! carries an [`ArtifactPersistenceError`].
//!
//! ## Residency
//!
//! At most `max_resident` artifact sets stay in memory; the least recently
//! used is dropped first. Evicted sets remain on disk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use zkimg_core::{CircuitKey, CircuitParams, Deadline, TransformKind};
use zkimg_crypto::{verify_file_digest, ArtifactStore, MANIFEST_FILE};

use crate::artifact::{ArtifactManifest, ArtifactSet, TrustedSetup, VerificationKey, VERIFICATION_KEY_FILE};
use crate::circuits::CircuitShape;
use crate::error::{ArtifactPersistenceError, CacheError, CompilationError, SetupError};
use crate::traits::{CompileRequest, ProvingBackend};

type Shared = Result<Arc<ArtifactSet>, CompilationError>;

/// Tunables for [`ArtifactCache`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Persistent artifact store root.
    pub artifact_dir: PathBuf,
    /// Scratch space for staging compilations.
    pub work_dir: PathBuf,
    /// Largest width or height a single circuit may witness.
    pub max_dimension: u32,
    /// Artifact sets kept in memory.
    pub max_resident: usize,
    /// Upper bound on one compilation, whatever the caller's deadline.
    pub compile_timeout: Duration,
}

enum Slot {
    Ready { artifact: Arc<ArtifactSet>, last_used: u64 },
    Pending(watch::Receiver<Option<Shared>>),
}

struct Inner<B: ProvingBackend> {
    backend: Arc<B>,
    setup: TrustedSetup,
    store: ArtifactStore,
    settings: CacheSettings,
    slots: Mutex<HashMap<CircuitKey, Slot>>,
    compilations: AtomicU64,
    clock: AtomicU64,
}

/// Single-flight, persistent cache of compiled circuits.
pub struct ArtifactCache<B: ProvingBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: ProvingBackend> Clone for ArtifactCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: ProvingBackend> ArtifactCache<B> {
    /// Create the cache, creating `artifact_dir` and `work_dir` if needed.
    pub fn new(backend: Arc<B>, setup: TrustedSetup, settings: CacheSettings) -> Result<Self, SetupError> {
        for dir in [&settings.artifact_dir, &settings.work_dir] {
            std::fs::create_dir_all(dir).map_err(|e| SetupError::Directory {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                setup,
                store: ArtifactStore::new(&settings.artifact_dir),
                settings,
                slots: Mutex::new(HashMap::new()),
                compilations: AtomicU64::new(0),
                clock: AtomicU64::new(0),
            }),
        })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    pub fn setup(&self) -> &TrustedSetup {
        &self.inner.setup
    }

    /// Compilations started by this cache instance (disk loads excluded).
    pub fn compilations(&self) -> u64 {
        self.inner.compilations.load(Ordering::SeqCst)
    }

    /// Artifact sets currently resident in memory.
    pub fn resident(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready { .. }))
            .count()
    }

    /// Artifacts for `(kind, params)`, compiling if necessary. Only the
    /// compile timeout bounds the wait.
    pub async fn ensure_artifacts(
        &self,
        kind: TransformKind,
        params: &CircuitParams,
    ) -> Result<Arc<ArtifactSet>, CacheError> {
        self.ensure_artifacts_within(kind, params, Deadline::none()).await
    }

    /// As [`ensure_artifacts`](Self::ensure_artifacts), giving up at
    /// `deadline`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Input`] for a missing parameter, impossible geometry
    ///   or a dimension over the limit. Nothing is compiled.
    /// - [`CacheError::Compilation`] when the compilation this call joined
    ///   failed.
    /// - [`CacheError::Timeout`] when `deadline` passed before the
    ///   artifacts were ready, or the compilation hit the compile timeout.
    ///   An abandoned wait does not cancel the compilation.
    pub async fn ensure_artifacts_within(
        &self,
        kind: TransformKind,
        params: &CircuitParams,
        deadline: Deadline,
    ) -> Result<Arc<ArtifactSet>, CacheError> {
        let shape = CircuitShape::from_params(kind, params)?;
        shape.check_limits(self.inner.settings.max_dimension)?;
        self.ensure_shape(shape, deadline).await
    }

    /// Artifacts for an already-resolved shape. Dimension limits are the
    /// caller's responsibility.
    pub async fn ensure_shape(
        &self,
        shape: CircuitShape,
        deadline: Deadline,
    ) -> Result<Arc<ArtifactSet>, CacheError> {
        let key = shape.key()?;
        let mut rx = {
            let mut slots = self.inner.slots.lock();
            match slots.get_mut(&key) {
                Some(Slot::Ready { artifact, last_used }) => {
                    *last_used = self.inner.tick();
                    return Ok(artifact.clone());
                }
                Some(Slot::Pending(rx)) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    slots.insert(key.clone(), Slot::Pending(rx.clone()));
                    spawn_compile(self.inner.clone(), key.clone(), shape, tx);
                    rx
                }
            }
        };

        let waited = {
            let wait = rx.wait_for(Option::is_some);
            match deadline.remaining() {
                Some(left) => match tokio::time::timeout(left, wait).await {
                    Ok(r) => r.map(|v| (*v).clone()),
                    Err(_) => return Err(CacheError::Timeout),
                },
                None => wait.await.map(|v| (*v).clone()),
            }
        };
        match waited {
            Ok(Some(Ok(artifact))) => Ok(artifact),
            Ok(Some(Err(CompilationError::Timeout))) => Err(CacheError::Timeout),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) | Err(_) => Err(CompilationError::Aborted(format!(
                "compile task for {key} ended without a result"
            ))
            .into()),
        }
    }

    /// The verification key for `key`, from memory or the store. Never
    /// compiles: an unknown circuit yields `None`.
    pub fn verification_key(&self, key: &CircuitKey) -> Option<VerificationKey> {
        if let Some(Slot::Ready { artifact, .. }) = self.inner.slots.lock().get(key) {
            return Some(artifact.verification_key().clone());
        }
        let (kind, sig) = key.store_path();
        let (dir, manifest) = match self.inner.store.read_manifest::<ArtifactManifest>(&kind, &sig) {
            Ok(Some(found)) => found,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(circuit = %key, error = %e, "unreadable artifact manifest");
                return None;
            }
        };
        if let Err(reason) =
            manifest.matches(key, self.inner.backend.kind(), self.inner.setup.fingerprint())
        {
            tracing::debug!(circuit = %key, reason = %reason, "persisted verification key not usable");
            return None;
        }
        let path = dir.join(VERIFICATION_KEY_FILE);
        if let Err(e) = verify_file_digest(&path, &manifest.verification_key_digest) {
            tracing::warn!(circuit = %key, error = %e, "persisted verification key failed integrity check");
            return None;
        }
        VerificationKey::read(manifest.backend, key.clone(), &dir).ok()
    }
}

impl<B: ProvingBackend> Inner<B> {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop least recently used resident sets beyond the limit.
    fn evict(&self, slots: &mut HashMap<CircuitKey, Slot>) {
        loop {
            let ready = slots.values().filter(|s| matches!(s, Slot::Ready { .. })).count();
            if ready <= self.settings.max_resident {
                return;
            }
            let oldest = slots
                .iter()
                .filter_map(|(k, s)| match s {
                    Slot::Ready { last_used, .. } => Some((*last_used, k)),
                    Slot::Pending(_) => None,
                })
                .min_by_key(|(t, _)| *t)
                .map(|(_, k)| k.clone());
            match oldest {
                Some(key) => {
                    tracing::debug!(circuit = %key, "evicting resident artifacts");
                    slots.remove(&key);
                }
                None => return,
            }
        }
    }

    /// Blocking: load from the store or compile and publish.
    fn load_or_compile(
        &self,
        key: &CircuitKey,
        shape: CircuitShape,
        deadline: Deadline,
    ) -> Result<Arc<ArtifactSet>, CompilationError> {
        let (kind, sig) = key.store_path();
        match self.store.read_manifest::<ArtifactManifest>(&kind, &sig) {
            Ok(Some((dir, manifest))) => {
                match manifest.matches(key, self.backend.kind(), self.setup.fingerprint()) {
                    Ok(()) => match ArtifactSet::load(&dir, manifest, shape) {
                        Ok(set) => {
                            tracing::debug!(circuit = %key, "loaded persisted artifacts");
                            return Ok(Arc::new(set));
                        }
                        Err(reason) => {
                            tracing::warn!(circuit = %key, reason = %reason, "persisted artifacts corrupt, recompiling")
                        }
                    },
                    Err(reason) => {
                        tracing::warn!(circuit = %key, reason = %reason, "persisted artifacts stale, recompiling")
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(circuit = %key, error = %e, "unreadable artifact manifest, recompiling"),
        }

        self.compilations.fetch_add(1, Ordering::SeqCst);
        let io = |e: &dyn std::fmt::Display| CompilationError::Io(e.to_string());
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.settings.work_dir)
            .map_err(|e| io(&e))?;

        tracing::info!(
            circuit = %key,
            estimated_constraints = shape.estimated_constraints(),
            "compiling circuit"
        );
        let started = Instant::now();
        let request = CompileRequest {
            key,
            shape: &shape,
            setup: &self.setup,
            out_dir: staging.path(),
        };
        let output = self.backend.compile(&request, deadline)?;
        if deadline.expired() {
            return Err(CompilationError::Timeout);
        }

        let manifest = ArtifactManifest::describe(
            staging.path(),
            key.clone(),
            self.backend.kind(),
            &self.setup,
            output.constraint_count,
            started.elapsed(),
        )
        .map_err(|e| io(&e))?;
        let json = serde_json::to_vec_pretty(&manifest).map_err(|e| io(&e))?;
        std::fs::write(staging.path().join(MANIFEST_FILE), json).map_err(|e| io(&e))?;
        tracing::info!(
            circuit = %key,
            constraints = manifest.constraint_count,
            compile_ms = manifest.compile_ms,
            "circuit compiled"
        );

        match self.store.publish(&kind, &sig, staging.path()) {
            Ok(dir) => {
                let set = ArtifactSet::load(&dir, manifest, shape).map_err(CompilationError::Io)?;
                Ok(Arc::new(set))
            }
            Err(e) => {
                let error = ArtifactPersistenceError {
                    circuit: key.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %error, "serving unpublished artifacts from staging");
                let set = ArtifactSet::load(staging.path(), manifest, shape).map_err(CompilationError::Io)?;
                Ok(Arc::new(set.unpublished(staging, error)))
            }
        }
    }
}

/// Removes a pending slot if the compile task dies without resolving it.
struct PendingGuard<B: ProvingBackend> {
    inner: Arc<Inner<B>>,
    key: CircuitKey,
    armed: bool,
}

impl<B: ProvingBackend> Drop for PendingGuard<B> {
    fn drop(&mut self) {
        if self.armed {
            let mut slots = self.inner.slots.lock();
            if matches!(slots.get(&self.key), Some(Slot::Pending(_))) {
                slots.remove(&self.key);
            }
        }
    }
}

fn spawn_compile<B: ProvingBackend>(
    inner: Arc<Inner<B>>,
    key: CircuitKey,
    shape: CircuitShape,
    tx: watch::Sender<Option<Shared>>,
) {
    tokio::spawn(async move {
        let mut guard = PendingGuard {
            inner: inner.clone(),
            key: key.clone(),
            armed: true,
        };
        let compile_deadline = Deadline::after(inner.settings.compile_timeout);

        // The slot stays pending until the blocking compile has returned, so
        // no second compile of this key can start while it runs. Backends
        // stop on their own once `compile_deadline` passes.
        let worker = inner.clone();
        let worker_key = key.clone();
        let task = tokio::task::spawn_blocking(move || {
            worker.load_or_compile(&worker_key, shape, compile_deadline)
        });
        let result: Shared = match task.await {
            Ok(r) => r,
            Err(e) => Err(CompilationError::Aborted(e.to_string())),
        };

        {
            let mut slots = inner.slots.lock();
            match &result {
                Ok(artifact) => {
                    slots.insert(
                        key.clone(),
                        Slot::Ready {
                            artifact: artifact.clone(),
                            last_used: inner.tick(),
                        },
                    );
                    inner.evict(&mut slots);
                }
                Err(e) => {
                    tracing::error!(circuit = %key, error = %e, "circuit compilation failed");
                    slots.remove(&key);
                }
            }
        }
        guard.armed = false;
        let _ = tx.send(Some(result));
    });
}

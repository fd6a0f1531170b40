//! # Open Chain Registry
//!
//! Chains under construction, keyed by an opaque [`ChainHandle`]. The
//! registry is bounded twice over: at most `max_open` chains at once, and
//! a chain untouched for longer than `ttl` is swept.
//!
//! The map lock is `parking_lot` and is never held across `.await`. Each
//! chain sits behind its own `tokio::sync::Mutex`, so steps on one chain
//! serialise while unrelated chains proceed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::ProofChain;

/// Opaque reference to an open chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainHandle(Uuid);

impl ChainHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChainHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for ChainHandle {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

pub type SharedChain = Arc<tokio::sync::Mutex<ProofChain>>;

#[derive(Debug)]
struct Entry {
    chain: SharedChain,
    touched: Instant,
}

/// Registry is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryFull {
    pub limit: usize,
}

#[derive(Debug)]
pub struct ChainRegistry {
    entries: Mutex<HashMap<ChainHandle, Entry>>,
    ttl: Duration,
    max_open: usize,
}

impl ChainRegistry {
    pub fn new(ttl: Duration, max_open: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_open,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }

    /// Register `chain` under a fresh handle. Expired chains are swept
    /// first.
    pub fn open(&self, chain: ProofChain) -> Result<(ChainHandle, SharedChain), RegistryFull> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::sweep_locked(&mut entries, self.ttl, now);
        if entries.len() >= self.max_open {
            return Err(RegistryFull { limit: self.max_open });
        }
        let handle = ChainHandle::new();
        let shared = Arc::new(tokio::sync::Mutex::new(chain));
        entries.insert(
            handle,
            Entry {
                chain: shared.clone(),
                touched: now,
            },
        );
        tracing::debug!(chain = %handle, open = entries.len(), "chain opened");
        Ok((handle, shared))
    }

    /// Look up an open chain and refresh its TTL. An expired chain is
    /// removed and reported as absent.
    pub fn get(&self, handle: &ChainHandle) -> Option<SharedChain> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = entries.get(handle).map(|e| now.duration_since(e.touched) > self.ttl)?;
        if expired {
            entries.remove(handle);
            tracing::debug!(chain = %handle, "chain expired");
            return None;
        }
        let entry = entries.get_mut(handle)?;
        entry.touched = now;
        Some(entry.chain.clone())
    }

    pub fn remove(&self, handle: &ChainHandle) -> Option<SharedChain> {
        self.entries.lock().remove(handle).map(|e| e.chain)
    }

    /// Drop every chain idle for longer than the TTL. Returns how many
    /// were dropped.
    pub fn sweep(&self) -> usize {
        Self::sweep_locked(&mut self.entries.lock(), self.ttl, Instant::now())
    }

    fn sweep_locked(entries: &mut HashMap<ChainHandle, Entry>, ttl: Duration, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.touched) <= ttl);
        let swept = before - entries.len();
        if swept > 0 {
            tracing::info!(swept, open = entries.len(), "expired chains swept");
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Sweep every `period` until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                match registry.upgrade() {
                    Some(registry) => {
                        registry.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_get_remove() {
        let registry = ChainRegistry::new(Duration::from_secs(60), 4);
        let (handle, _) = registry.open(ProofChain::default()).unwrap();
        assert!(registry.get(&handle).is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&handle).is_some());
        assert!(registry.get(&handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn limit_is_enforced() {
        let registry = ChainRegistry::new(Duration::from_secs(60), 2);
        registry.open(ProofChain::default()).unwrap();
        registry.open(ProofChain::default()).unwrap();
        assert_eq!(registry.open(ProofChain::default()).unwrap_err(), RegistryFull { limit: 2 });
    }

    #[test]
    fn expired_chains_are_swept_and_free_capacity() {
        let registry = ChainRegistry::new(Duration::from_millis(20), 1);
        let (stale, _) = registry.open(ProofChain::default()).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(registry.get(&stale).is_none());

        registry.open(ProofChain::default()).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(registry.open(ProofChain::default()).is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_refreshes_ttl() {
        let registry = ChainRegistry::new(Duration::from_millis(60), 4);
        let (handle, _) = registry.open(ProofChain::default()).unwrap();
        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(25));
            assert!(registry.get(&handle).is_some());
        }
        assert_eq!(registry.sweep(), 0);
    }

    #[tokio::test]
    async fn sweeper_stops_with_registry() {
        let registry = Arc::new(ChainRegistry::new(Duration::from_millis(5), 4));
        registry.open(ProofChain::default()).unwrap();
        let task = registry.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_empty());
        drop(registry);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[test]
    fn handle_serializes_as_uuid() {
        let handle = ChainHandle::new();
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, format!("\"{}\"", handle.as_uuid()));
    }
}

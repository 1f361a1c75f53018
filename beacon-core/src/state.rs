//! Shared store state: the one place deltas enter.
//!
//! "Mutate store, rebuild, publish" runs as one unit under a single writer
//! mutex. Readers only touch the already-published snapshot and an atomic
//! copy of the highwater mark, so they never wait on a writer.
//!
//! The caller's own writes are held as pending entries layered over the
//! store rather than applied to it. They never move the highwater mark, which
//! only reflects versions a source delivered. A pending write is dropped once
//! the store accepts a delta for the same key that the server produced after
//! it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::resolver::{NamespaceResolver, ResolvedEntry, Snapshot};
use crate::store::DeltaStore;
use crate::types::{ConfigValue, Delta};

/// Result of applying one batch of deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub discarded: usize,
    pub highwater: u64,
}

impl BatchOutcome {
    pub fn changed(&self) -> bool {
        self.applied > 0
    }
}

#[derive(Debug, Clone)]
struct PendingWrite {
    delta: Delta,
    /// Smallest store version for the key that replaces this write.
    superseded_at: u64,
}

#[derive(Debug, Default)]
struct Inner {
    store: DeltaStore,
    pending: HashMap<String, PendingWrite>,
}

impl Inner {
    fn stored_version(&self, key: &str) -> u64 {
        self.store.get(key).map_or(0, |entry| entry.version)
    }
}

#[derive(Debug)]
pub struct ConfigState {
    inner: Mutex<Inner>,
    resolver: NamespaceResolver,
    highwater: AtomicU64,
}

impl ConfigState {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            resolver: NamespaceResolver::new(namespace),
            highwater: AtomicU64::new(0),
        }
    }

    fn publish(&self, inner: &Inner) {
        let pending = &inner.pending;
        self.resolver.rebuild(
            inner
                .store
                .entries()
                .filter(|entry| !pending.contains_key(&entry.key))
                .chain(pending.values().map(|write| &write.delta)),
        );
    }

    /// Apply a batch of source deltas, then rebuild and publish once if
    /// anything changed.
    pub fn apply_batch(&self, deltas: impl IntoIterator<Item = Delta>) -> BatchOutcome {
        let mut inner = self.inner.lock();
        let mut outcome = BatchOutcome::default();
        for delta in deltas {
            let supersedes = inner
                .pending
                .get(&delta.key)
                .is_some_and(|write| delta.version >= write.superseded_at);
            let key = supersedes.then(|| delta.key.clone());
            if inner.store.apply(delta) {
                outcome.applied += 1;
                if let Some(key) = key {
                    inner.pending.remove(&key);
                }
            } else {
                outcome.discarded += 1;
            }
        }
        if outcome.changed() {
            self.publish(&inner);
        }
        outcome.highwater = inner.store.highwater_mark();
        self.highwater.store(outcome.highwater, Ordering::Release);
        outcome
    }

    /// Layer the caller's own write over the store.
    ///
    /// `confirmed` is the version the server assigned, if it returned one.
    /// A confirmed write gives way once the store holds that version of the
    /// key; an unconfirmed one gives way to any newer delta for the key.
    /// Returns `false` when the store already holds the confirmed version.
    pub fn apply_local(&self, delta: Delta, confirmed: Option<u64>) -> bool {
        let mut inner = self.inner.lock();
        let stored = inner.stored_version(&delta.key);
        let superseded_at = match confirmed {
            Some(version) if version <= stored => {
                inner.pending.remove(&delta.key);
                self.publish(&inner);
                return false;
            }
            Some(version) => version,
            None => stored + 1,
        };
        inner.pending.insert(
            delta.key.clone(),
            PendingWrite {
                delta,
                superseded_at,
            },
        );
        self.publish(&inner);
        true
    }

    /// Remove a raw key, stored or pending, and republish.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let stored = inner.store.remove(key).is_some();
        let pending = inner.pending.remove(key).is_some();
        let removed = stored || pending;
        if removed {
            self.publish(&inner);
        }
        removed
    }

    /// Maximum version accepted from a source. Local writes never move it.
    pub fn highwater_mark(&self) -> u64 {
        self.highwater.load(Ordering::Acquire)
    }

    /// Version label for the next local write: one past everything seen,
    /// pending writes included.
    pub fn next_local_version(&self) -> u64 {
        let inner = self.inner.lock();
        let pending_max = inner
            .pending
            .values()
            .map(|write| write.delta.version)
            .max()
            .unwrap_or(0);
        inner.store.highwater_mark().max(pending_max) + 1
    }

    pub fn pending_writes(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn namespace(&self) -> &str {
        self.resolver.namespace()
    }

    pub fn get(&self, bare_key: &str) -> Option<ConfigValue> {
        self.resolver.get(bare_key)
    }

    pub fn raw(&self, bare_key: &str) -> Option<ResolvedEntry> {
        self.resolver.raw(bare_key)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.resolver.snapshot()
    }

    /// Copy of every stored entry, sorted by key, for cache persistence.
    /// Pending writes are left out.
    pub fn export(&self) -> Vec<Delta> {
        let inner = self.inner.lock();
        let mut entries: Vec<Delta> = inner.store.entries().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

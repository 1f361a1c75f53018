//! Versioned delta store.
//!
//! Holds the latest accepted [`Delta`] per raw key. A delta is accepted only
//! when its version is strictly greater than the stored one (or the key is
//! new), so replaying any interleaving of sources converges to the same state.

use std::collections::HashMap;

use crate::types::{Delta, Entry};

/// Latest version of every known raw key, plus the highwater mark.
#[derive(Debug, Default, Clone)]
pub struct DeltaStore {
    entries: HashMap<String, Entry>,
    highwater: u64,
}

impl DeltaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `delta` if it is newer than the stored entry.
    ///
    /// Returns `true` when the store changed. Stale and duplicate deltas are
    /// dropped silently.
    pub fn apply(&mut self, delta: Delta) -> bool {
        if let Some(stored) = self.entries.get(&delta.key) {
            if delta.version <= stored.version {
                return false;
            }
        }
        self.highwater = self.highwater.max(delta.version);
        self.entries.insert(delta.key.clone(), delta);
        true
    }

    /// Remove an entry unconditionally. The highwater mark is left as is.
    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.entries.remove(key)
    }

    /// Maximum version ever accepted.
    pub fn highwater_mark(&self) -> u64 {
        self.highwater
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Every stored entry, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

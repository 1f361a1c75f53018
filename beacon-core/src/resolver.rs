//! Namespace resolution: raw entries -> one effective value per bare key.
//!
//! An entry scoped to namespace `N` is a candidate for a client configured
//! with namespace `C` when the dot-segments of `N` are a prefix of (or equal
//! to) those of `C`. The candidate with the most segments wins; unscoped
//! entries have zero segments and act as the fallback.
//!
//! Every rebuild produces a fresh immutable [`Snapshot`] that is published
//! with a single atomic swap, so readers never observe a partial rebuild.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::{split_key, ConfigValue, Entry};

/// The winning raw entry for a bare key, with the namespace it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    pub namespace: String,
    pub entry: Entry,
}

/// Immutable bare key -> resolved entry view.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    entries: HashMap<String, ResolvedEntry>,
}

impl Snapshot {
    /// Resolve `entries` for a client configured with `client_namespace`.
    pub fn build<'a>(client_namespace: &str, entries: impl IntoIterator<Item = &'a Entry>) -> Self {
        let mut resolved: HashMap<String, (usize, ResolvedEntry)> = HashMap::new();
        for entry in entries {
            let (namespace, bare) = split_key(&entry.key);
            let Some(specificity) = namespace_specificity(namespace, client_namespace) else {
                continue;
            };
            let more_specific = resolved
                .get(bare)
                .map(|(existing, _)| *existing < specificity)
                .unwrap_or(true);
            if more_specific {
                resolved.insert(
                    bare.to_string(),
                    (
                        specificity,
                        ResolvedEntry {
                            namespace: namespace.to_string(),
                            entry: entry.clone(),
                        },
                    ),
                );
            }
        }
        Self {
            entries: resolved
                .into_iter()
                .map(|(bare, (_, resolved))| (bare, resolved))
                .collect(),
        }
    }

    pub fn get(&self, bare_key: &str) -> Option<&ConfigValue> {
        self.entries.get(bare_key).map(|r| &r.entry.value)
    }

    pub fn raw(&self, bare_key: &str) -> Option<&ResolvedEntry> {
        self.entries.get(bare_key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Snapshot {
    /// One `|key| |value|` line per entry, sorted by key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        for key in keys {
            let resolved = &self.entries[key];
            writeln!(
                f,
                "|{key}| |{}| {}",
                resolved.entry.value,
                resolved.entry.value_type()
            )?;
        }
        Ok(())
    }
}

/// Segment count of `entry_namespace` if it applies to `client_namespace`.
fn namespace_specificity(entry_namespace: &str, client_namespace: &str) -> Option<usize> {
    if entry_namespace.is_empty() {
        return Some(0);
    }
    let entry_segments: Vec<&str> = entry_namespace.split('.').collect();
    let client_segments: Vec<&str> = if client_namespace.is_empty() {
        Vec::new()
    } else {
        client_namespace.split('.').collect()
    };
    if entry_segments.len() > client_segments.len() {
        return None;
    }
    entry_segments
        .iter()
        .zip(&client_segments)
        .all(|(a, b)| a == b)
        .then_some(entry_segments.len())
}

/// Publishes resolved snapshots for one client namespace.
pub struct NamespaceResolver {
    namespace: String,
    current: ArcSwap<Snapshot>,
}

impl NamespaceResolver {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            current: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Recompute the snapshot from `entries` and swap it in.
    pub fn rebuild<'a>(&self, entries: impl IntoIterator<Item = &'a Entry>) {
        let snapshot = Snapshot::build(&self.namespace, entries);
        tracing::trace!(keys = snapshot.len(), "published resolved snapshot");
        self.current.store(Arc::new(snapshot));
    }

    /// Current value for `bare_key`. Never blocks and never rebuilds.
    pub fn get(&self, bare_key: &str) -> Option<ConfigValue> {
        self.current.load().get(bare_key).cloned()
    }

    pub fn raw(&self, bare_key: &str) -> Option<ResolvedEntry> {
        self.current.load().raw(bare_key).cloned()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}

impl fmt::Debug for NamespaceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceResolver")
            .field("namespace", &self.namespace)
            .field("keys", &self.current.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Delta;

    #[test]
    fn segment_prefix_not_string_prefix() {
        assert_eq!(namespace_specificity("a", "a.b.c"), Some(1));
        assert_eq!(namespace_specificity("a.b", "a.b"), Some(2));
        assert_eq!(namespace_specificity("a", "ab.c"), None);
        assert_eq!(namespace_specificity("a.b.c", "a.b"), None);
        assert_eq!(namespace_specificity("", "anything"), Some(0));
        assert_eq!(namespace_specificity("a", ""), None);
    }

    #[test]
    fn rebuild_swaps_whole_snapshot() {
        let resolver = NamespaceResolver::new("svc");
        let before = resolver.snapshot();
        resolver.rebuild(&[Delta::new("svc:x", 1, "scoped")]);
        assert!(before.is_empty(), "old snapshot must be untouched");
        assert_eq!(resolver.get("x"), Some(ConfigValue::from("scoped")));
        assert_eq!(resolver.raw("x").map(|r| r.namespace), Some("svc".to_string()));
    }

    #[test]
    fn display_lists_sorted_keys() {
        let snapshot = Snapshot::build("", &[Delta::new("b", 1, 2i64), Delta::new("a", 1, "one")]);
        let dump = snapshot.to_string();
        assert_eq!(dump, "|a| |one| string\n|b| |2| int\n");
    }
}

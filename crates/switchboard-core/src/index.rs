//! Secondary index: key → set of connection ids.
//!
//! Used for both the user index and the room index. A key exists only while
//! its set is non-empty.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Multimap from an index key (user id, room id) to connection ids.
#[derive(Debug, Default, Clone)]
pub struct ConnectionIndex {
    entries: HashMap<String, HashSet<String>>,
}

impl ConnectionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` under `key`, creating the set if absent.
    ///
    /// Returns `false` if `id` was already present under `key`.
    pub fn insert(&mut self, key: &str, id: &str) -> bool {
        self.entries
            .entry(key.to_owned())
            .or_default()
            .insert(id.to_owned())
    }

    /// Remove `id` from `key`, dropping the key once its set is empty.
    ///
    /// Returns `false` if `id` was not present under `key`.
    pub fn remove(&mut self, key: &str, id: &str) -> bool {
        let Some(set) = self.entries.get_mut(key) else {
            return false;
        };
        let removed = set.remove(id);
        if set.is_empty() {
            let _ = self.entries.remove(key);
        }
        removed
    }

    /// Connection ids under `key` (copied out; empty if the key is absent).
    pub fn ids(&self, key: &str) -> Vec<String> {
        self.entries
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The id set under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&HashSet<String>> {
        self.entries.get(key)
    }

    /// Whether `id` is indexed under `key`.
    pub fn contains(&self, key: &str, id: &str) -> bool {
        self.entries.get(key).is_some_and(|set| set.contains(id))
    }

    /// Whether `key` has at least one connection.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Connection count per key, sorted by key.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.entries
            .iter()
            .map(|(key, set)| (key.clone(), set.len()))
            .collect()
    }

    /// Iterate over `(key, ids)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HashSet<String>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

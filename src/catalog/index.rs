//! Secondary indices over catalog records
//!
//! Each index maps a key to the set of record names filed under it. Names are
//! kept in ordered sets so lookups come back in a stable order.

use std::collections::{BTreeMap, BTreeSet};

/// Key -> record names
#[derive(Debug)]
pub(crate) struct NameIndex<K: Ord> {
    entries: BTreeMap<K, BTreeSet<String>>,
}

impl<K: Ord> Default for NameIndex<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> NameIndex<K> {
    /// File `name` under `key`
    pub(crate) fn insert(&mut self, key: K, name: &str) {
        self.entries
            .entry(key)
            .or_default()
            .insert(name.to_string());
    }

    /// Remove `name` from `key`, dropping the key once empty
    pub(crate) fn remove(&mut self, key: &K, name: &str) {
        if let Some(names) = self.entries.get_mut(key) {
            names.remove(name);
            if names.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Names filed under `key`
    pub(crate) fn get(&self, key: &K) -> impl Iterator<Item = &str> {
        self.entries
            .get(key)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// All keys with their names
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &BTreeSet<String>)> {
        self.entries.iter()
    }

    /// Number of distinct keys
    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.entries.len()
    }
}

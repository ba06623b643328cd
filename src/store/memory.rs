//! MemoryStore implementation
//!
//! HashMap-based tables, each behind its own RwLock.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;

use super::Store;

type StringTable = HashMap<Bytes, Bytes>;
type HashTable = HashMap<Bytes, HashMap<Bytes, Bytes>>;

/// Process-wide in-memory tables
///
/// ## Concurrency:
/// - `strings` and `hashes` have separate locks, so a write to one never
///   blocks access to the other
/// - Reads take the shared lock and copy out what they return; no guard ever
///   escapes a method
#[derive(Default)]
pub struct MemoryStore {
    strings: RwLock<StringTable>,
    hashes: RwLock<HashTable>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// True when both tables are empty
    pub fn is_empty(&self) -> bool {
        self.string_len() == 0 && self.hash_len() == 0
    }

    /// Copy of the whole string table (diagnostics and tests)
    pub fn strings_snapshot(&self) -> StringTable {
        self.strings.read().clone()
    }

    /// Copy of the whole hash table (diagnostics and tests)
    pub fn hashes_snapshot(&self) -> HashTable {
        self.hashes.read().clone()
    }
}

impl Store for MemoryStore {
    fn set(&self, key: Bytes, value: Bytes) {
        self.strings.write().insert(key, value);
    }

    fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.strings.read().get(key).cloned()
    }

    fn hset(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> usize {
        if pairs.is_empty() {
            return 0;
        }

        let mut hashes = self.hashes.write();
        let fields = hashes.entry(key).or_default();

        let mut created = 0;
        for (field, value) in pairs {
            if fields.insert(field, value).is_none() {
                created += 1;
            }
        }
        created
    }

    fn hget(&self, key: &[u8], field: &[u8]) -> Option<Bytes> {
        self.hashes
            .read()
            .get(key)
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    fn hgetall(&self, key: &[u8]) -> Vec<(Bytes, Bytes)> {
        match self.hashes.read().get(key) {
            Some(fields) => fields
                .iter()
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    fn string_len(&self) -> usize {
        self.strings.read().len()
    }

    fn hash_len(&self) -> usize {
        self.hashes.read().len()
    }
}

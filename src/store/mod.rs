//! Store Module
//!
//! In-memory tables that command handlers read and mutate.
//!
//! ## Responsibilities
//! - StringTable: key → value
//! - HashTable: key → (field → value)
//! - Many concurrent readers or one writer per table
//! - The two tables lock independently
//!
//! The tables are a cache of the append-only file: they start empty and are
//! rebuilt by replaying the log at startup.

mod memory;

pub use memory::MemoryStore;

use bytes::Bytes;

/// Storage backend used by the command dispatcher
///
/// Implementations must make each call atomic with respect to other calls on
/// the same table. A key present in the hash table always has at least one
/// field.
pub trait Store: Send + Sync {
    /// Upsert `key -> value` in the string table
    fn set(&self, key: Bytes, value: Bytes);

    /// Look up `key` in the string table
    fn get(&self, key: &[u8]) -> Option<Bytes>;

    /// Upsert every `(field, value)` pair under `key`, in order
    ///
    /// Returns how many fields did not exist before. An empty `pairs` leaves
    /// the table untouched.
    fn hset(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> usize;

    /// Look up `field` under `key` in the hash table
    fn hget(&self, key: &[u8], field: &[u8]) -> Option<Bytes>;

    /// Snapshot of every `(field, value)` pair under `key`, in no particular
    /// order; empty when the key is absent
    fn hgetall(&self, key: &[u8]) -> Vec<(Bytes, Bytes)>;

    /// Number of keys in the string table
    fn string_len(&self) -> usize;

    /// Number of keys in the hash table
    fn hash_len(&self) -> usize;
}

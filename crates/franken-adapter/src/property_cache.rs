//! Memo of resolved fallback attributes.
//!
//! Populated by the first fallback read of a key, upserted by every write,
//! never evicted. Entries live exactly as long as the owning adapter, which
//! is what makes repeated fallback reads idempotent: once a key has an
//! entry, the target storage is not consulted for it again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{AdapterValue, AttributeKey, entries_as_seq};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCache {
    #[serde(with = "entries_as_seq")]
    entries: BTreeMap<AttributeKey, AdapterValue>,
    stats: CacheStats,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, or `None` on a miss.
    pub fn get(&mut self, key: &AttributeKey) -> Option<&AdapterValue> {
        match self.entries.get(key) {
            Some(value) => {
                self.stats.hits = self.stats.hits.saturating_add(1);
                Some(value)
            }
            None => {
                self.stats.misses = self.stats.misses.saturating_add(1);
                None
            }
        }
    }

    /// Inspect an entry without touching the counters.
    pub fn peek(&self, key: &AttributeKey) -> Option<&AdapterValue> {
        self.entries.get(key)
    }

    /// Store unconditionally, returning the previous entry.
    pub fn set(&mut self, key: AttributeKey, value: AdapterValue) -> Option<AdapterValue> {
        self.stats.writes = self.stats.writes.saturating_add(1);
        self.entries.insert(key, value)
    }

    pub fn contains(&self, key: &AttributeKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &AttributeKey> {
        self.entries.keys()
    }

    pub fn entries(&self) -> &BTreeMap<AttributeKey, AdapterValue> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

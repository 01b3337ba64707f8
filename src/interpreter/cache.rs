//! Discovered interpreter cache.
//!
//! Entries are keyed by task snapshot and interpreter family, so two tasks
//! never see each other's discoveries. Each key also owns a mutex that
//! serializes discovery for that key. Both go away when the snapshot that
//! owns them is dropped.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::vars::{SnapshotId, SnapshotScoped, UnsafeText};

/// Key of one cached interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    snapshot: SnapshotId,
    family: String,
}

impl CacheKey {
    /// Create a key for `family` within `snapshot`.
    pub fn new(snapshot: SnapshotId, family: impl Into<String>) -> Self {
        Self {
            snapshot,
            family: family.into(),
        }
    }

    /// The task snapshot this entry belongs to.
    pub fn snapshot(&self) -> SnapshotId {
        self.snapshot
    }

    /// Interpreter family, e.g. `python`.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Fact name the discovered value is published under.
    pub fn fact_name(&self) -> String {
        format!("discovered_interpreter_{}", self.family)
    }
}

/// Shared store of discovered interpreters.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    entries: DashMap<CacheKey, UnsafeText>,
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl DiscoveryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached interpreter.
    pub fn get(&self, key: &CacheKey) -> Option<UnsafeText> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Store an interpreter, replacing any previous entry.
    pub fn insert(&self, key: CacheKey, interpreter: UnsafeText) {
        self.entries.insert(key, interpreter);
    }

    /// Remove an entry. Returns true if one existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry belonging to a finished snapshot.
    pub fn release(&self, snapshot: SnapshotId) {
        self.entries.retain(|key, _| key.snapshot != snapshot);
        self.locks.retain(|key, _| key.snapshot != snapshot);
    }

    /// Mutex serializing discovery for `key`.
    ///
    /// Hold its guard across check-discover-insert; a caller that waited on
    /// it must re-read the cache before discovering.
    pub fn lock_for(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Number of cached interpreters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotScoped for DiscoveryCache {
    fn release(&self, snapshot: SnapshotId) {
        DiscoveryCache::release(self, snapshot);
    }
}

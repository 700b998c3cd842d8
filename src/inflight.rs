use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::lock;

/// Set of keys with a mutation currently awaiting the server.
///
/// [`InFlight::begin`] hands out a guard that releases the key when dropped,
/// so a key is freed however the mutation ends.
pub struct InFlight<K: Eq + Hash> {
    keys: Arc<Mutex<HashSet<K>>>,
}

pub struct InFlightGuard<K: Eq + Hash> {
    keys: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub fn new() -> Self {
        InFlight {
            keys: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claims `key`, or returns `None` if a mutation for it is already running.
    pub fn begin(&self, key: K) -> Option<InFlightGuard<K>> {
        let mut keys = lock(&self.keys);
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    pub fn contains(&self, key: &K) -> bool {
        lock(&self.keys).contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for InFlight<K> {
    fn default() -> Self {
        InFlight::new()
    }
}

impl<K: Eq + Hash> Clone for InFlight<K> {
    fn clone(&self) -> Self {
        InFlight {
            keys: Arc::clone(&self.keys),
        }
    }
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        lock(&self.keys).remove(&self.key);
    }
}

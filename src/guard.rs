//! Single-flight guard: at most one holder per key at a time.
//!
//! `try_enter` never waits. The returned permit owns its key and releases it
//! on drop, so it can be moved into a spawned task.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashSet;

#[derive(Debug)]
pub struct InFlight<K: Eq + Hash> {
    keys: Arc<DashSet<K>>,
}

impl<K: Eq + Hash> Clone for InFlight<K> {
    fn clone(&self) -> Self {
        Self { keys: Arc::clone(&self.keys) }
    }
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub fn new() -> Self {
        Self { keys: Arc::new(DashSet::new()) }
    }

    /// Claim `key`, or `None` if another holder has it.
    pub fn try_enter(&self, key: K) -> Option<InFlightPermit<K>> {
        if !self.keys.insert(key.clone()) {
            return None;
        }
        Some(InFlightPermit {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    #[cfg(test)]
    pub fn is_held(&self, key: &K) -> bool {
        self.keys.contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for InFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct InFlightPermit<K: Eq + Hash> {
    keys: Arc<DashSet<K>>,
    key: K,
}

impl<K: Eq + Hash> Drop for InFlightPermit<K> {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}

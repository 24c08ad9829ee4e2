//! Keyed locks for serialising operations against one remote object
//!
//! Several resources can mutate the same remote parent (every listener
//! policy rule lives on one load balancer). Operations that share a key
//! run one at a time; operations on different keys run concurrently.

use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of named async mutexes
///
/// Locks are created on first use and never removed.
#[derive(Debug, Default, Clone)]
pub struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Guard holding one key's lock until dropped
#[derive(Debug)]
pub struct KeyedGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        debug!("Released lock '{}'", self.key);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for `key`, waiting for any current holder
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let mutex = self.entry(key);
        debug!("Waiting for lock '{}'", key);
        let guard = mutex.lock_owned().await;
        debug!("Acquired lock '{}'", key);
        KeyedGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

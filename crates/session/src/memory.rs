//! In-memory credential store
//!
//! Holds values in a mutex-guarded map together with the policy each was
//! written with. Used by callers that have no cookie jar (background jobs,
//! tests) and by the gateway's own tests to observe what was stored.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::policy::CookiePolicy;
use crate::store::CredentialStore;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    policy: CookiePolicy,
}

/// Thread-safe map-backed `CredentialStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy the value under `name` was last written with.
    pub fn policy_of(&self, name: &str) -> Option<CookiePolicy> {
        self.lock().get(name).map(|e| e.policy.clone())
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a half-written entry.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).map(|e| e.value.clone())
    }

    fn set(&self, name: &str, value: &str, policy: &CookiePolicy) {
        self.lock().insert(
            name.to_string(),
            Entry {
                value: value.to_string(),
                policy: policy.clone(),
            },
        );
        debug!(name, "stored session value");
    }

    fn delete(&self, name: &str, _policy: &CookiePolicy) {
        if self.lock().remove(name).is_some() {
            debug!(name, "deleted session value");
        }
    }
}

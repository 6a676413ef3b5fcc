//! Rotating pool of Gemini API keys.
//!
//! Each remote call checks out a key for its duration. Checkout prefers the
//! least-used key, scanning from a cursor that advances after every handout,
//! so concurrent requests spread across keys instead of all hitting the first.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no Gemini API keys configured; pass --api-keys or set api_keys in the config file")]
    Empty,
}

#[derive(Debug)]
struct PoolState {
    keys: Vec<Arc<str>>,
    leases: Vec<usize>,
    cursor: usize,
}

#[derive(Debug)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    pub fn new<I, S>(keys: I) -> Result<Arc<Self>, CredentialError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<Arc<str>> = keys
            .into_iter()
            .map(|key| key.as_ref().trim().to_string())
            .filter(|key| !key.is_empty())
            .map(Arc::from)
            .collect();
        if keys.is_empty() {
            return Err(CredentialError::Empty);
        }
        let leases = vec![0; keys.len()];
        Ok(Arc::new(Self {
            state: Mutex::new(PoolState {
                keys,
                leases,
                cursor: 0,
            }),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Never blocks; several leases may share a key when requests outnumber keys.
    pub fn checkout(self: &Arc<Self>) -> CredentialLease {
        let mut state = self.lock();
        let count = state.keys.len();
        let slot = (0..count)
            .map(|offset| (state.cursor + offset) % count)
            .min_by_key(|&slot| state.leases[slot])
            .unwrap_or(0);
        state.leases[slot] += 1;
        state.cursor = (slot + 1) % count;
        CredentialLease {
            pool: Arc::clone(self),
            slot,
            key: Arc::clone(&state.keys[slot]),
        }
    }

    fn release(&self, slot: usize) {
        let mut state = self.lock();
        if let Some(count) = state.leases.get_mut(slot) {
            *count = count.saturating_sub(1);
        }
    }

    #[cfg(test)]
    fn outstanding(&self) -> Vec<usize> {
        self.lock().leases.clone()
    }
}

/// A key on loan from the pool, returned on drop.
pub struct CredentialLease {
    pool: Arc<CredentialPool>,
    slot: usize,
    key: Arc<str>,
}

impl CredentialLease {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("slot", &self.slot)
            .field("key", &mask_key(&self.key))
            .finish()
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}

/// Last four characters only, for logs.
pub fn mask_key(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{tail}")
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::StoreInner;
use crate::error::{Result, StrataError};

/// How often `obtain` re-checks a contended lock
pub const LOCK_POLL_INTERVAL_MS: u64 = 10;

/// Exclusive advisory lock scoped to one store.
///
/// Only cooperating callers that go through `make_lock` see it; the store
/// does not stop anyone from writing a file while a lock is held. Locks are
/// non-reentrant and released on drop.
#[derive(Debug)]
pub struct StoreLock {
    store: Arc<Mutex<StoreInner>>,
    name: String,
    held: bool,
}

impl StoreLock {
    pub(crate) fn new(store: Arc<Mutex<StoreInner>>, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
            held: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Try to take the lock, waiting up to `timeout_ms`.
    ///
    /// Returns `Ok(false)` when the wait times out. Calling this on an
    /// instance that already holds the lock is an error (`LockHeld`).
    pub fn obtain(&mut self, timeout_ms: u64) -> Result<bool> {
        if self.held {
            return Err(StrataError::LockHeld(self.name.clone()));
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.store.lock().held_locks.insert(self.name.clone()) {
                self.held = true;
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(lock = %self.name, timeout_ms, "lock obtain timed out");
                return Ok(false);
            }
            let wait = (deadline - now).min(Duration::from_millis(LOCK_POLL_INTERVAL_MS));
            std::thread::sleep(wait);
        }
    }

    pub fn release(&mut self) {
        if self.held {
            self.store.lock().held_locks.remove(&self.name);
            self.held = false;
        }
    }

    /// Whether anyone currently holds a lock with this name
    pub fn is_locked(&self) -> bool {
        self.store.lock().held_locks.contains(&self.name)
    }

    /// Whether this instance holds the lock
    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        self.release();
    }
}

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::{CacheConfig, CacheKind};
use crate::error::{Result, StrataError};
use crate::types::Ordinal;

/// Key → ordinal cache used by writers that hand out ordinals.
///
/// A miss does not mean the key has no ordinal: it may have been evicted.
/// `put` returns `true` exactly when it evicted something, which tells the
/// caller that earlier mappings may no longer resolve through the cache.
pub trait OrdinalCache: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Ordinal>>;

    /// Cache `key → ordinal`; returns whether entries were evicted.
    fn put(&self, key: &[u8], ordinal: Ordinal) -> Result<bool>;

    /// If true, the next `n` puts will not evict.
    fn has_room(&self, n: usize) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);

    /// Drop all entries; later `get` / `put` calls fail with `Closed`.
    fn close(&self);
}

fn check_ordinal(ordinal: Ordinal) -> Result<()> {
    if ordinal.is_valid() {
        Ok(())
    } else {
        Err(StrataError::InvalidRequest(format!(
            "ordinal must be positive, got {}",
            ordinal
        )))
    }
}

struct LruState {
    entries: LruCache<Vec<u8>, Ordinal>,
    closed: bool,
}

/// Bounded cache evicting the least recently used key.
///
/// `get` counts as a use. Eviction order depends only on the sequence of
/// calls, so a fixed sequence always evicts the same keys.
pub struct LruOrdinalCache {
    state: Mutex<LruState>,
    capacity: usize,
}

impl LruOrdinalCache {
    pub fn new(capacity: usize) -> Result<Self> {
        let cap = NonZeroUsize::new(capacity).ok_or_else(|| {
            StrataError::Config("ordinal cache capacity must be positive".to_string())
        })?;
        Ok(Self {
            state: Mutex::new(LruState {
                entries: LruCache::new(cap),
                closed: false,
            }),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl OrdinalCache for LruOrdinalCache {
    fn get(&self, key: &[u8]) -> Result<Option<Ordinal>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(StrataError::Closed("ordinal cache".to_string()));
        }
        Ok(state.entries.get(key).copied())
    }

    fn put(&self, key: &[u8], ordinal: Ordinal) -> Result<bool> {
        check_ordinal(ordinal)?;
        let mut state = self.state.lock();
        if state.closed {
            return Err(StrataError::Closed("ordinal cache".to_string()));
        }

        if let Some(existing) = state.entries.get_mut(key) {
            *existing = ordinal;
            return Ok(false);
        }

        let evicted = state.entries.push(key.to_vec(), ordinal).is_some();
        if evicted {
            debug!(capacity = self.capacity, "ordinal cache evicted an entry");
        }
        Ok(evicted)
    }

    fn has_room(&self, n: usize) -> bool {
        let state = self.state.lock();
        !state.closed && self.capacity - state.entries.len() >= n
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn clear(&self) {
        self.state.lock().entries.clear();
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.closed = true;
    }
}

/// Cache that keeps every key and never evicts.
#[derive(Default)]
pub struct UnboundedOrdinalCache {
    entries: DashMap<Vec<u8>, Ordinal>,
    closed: AtomicBool,
}

impl UnboundedOrdinalCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StrataError::Closed("ordinal cache".to_string()))
        } else {
            Ok(())
        }
    }
}

impl OrdinalCache for UnboundedOrdinalCache {
    fn get(&self, key: &[u8]) -> Result<Option<Ordinal>> {
        self.ensure_open()?;
        Ok(self.entries.get(key).map(|e| *e.value()))
    }

    fn put(&self, key: &[u8], ordinal: Ordinal) -> Result<bool> {
        check_ordinal(ordinal)?;
        self.ensure_open()?;
        self.entries.insert(key.to_vec(), ordinal);
        Ok(false)
    }

    fn has_room(&self, _n: usize) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn close(&self) {
        self.entries.clear();
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Build the cache described by `config`
pub fn new_ordinal_cache(config: &CacheConfig) -> Result<Arc<dyn OrdinalCache>> {
    Ok(match config.kind {
        CacheKind::Lru => Arc::new(LruOrdinalCache::new(config.ordinal_capacity)?),
        CacheKind::Unbounded => Arc::new(UnboundedOrdinalCache::new()),
    })
}

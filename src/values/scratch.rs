/// Reusable result arrays for small lookups.
///
/// One pool belongs to one worker thread (it is handed out by `&mut`, so it
/// can never be shared). Each result size below the limit has its own array
/// that is cleared and refilled on every call; larger results get a fresh
/// allocation. The returned slice borrows the pool, so a result cannot
/// outlive the next lookup made with the same pool.
#[derive(Debug)]
pub struct ScratchPool<V> {
    slots: Vec<Vec<V>>,
    oversized: Vec<V>,
    limit: usize,
}

impl<V> ScratchPool<V> {
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn new() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        let mut slots = Vec::with_capacity(limit);
        slots.resize_with(limit, Vec::new);
        Self {
            slots,
            oversized: Vec::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// An empty array with room for `len` values.
    pub(crate) fn take(&mut self, len: usize) -> &mut Vec<V> {
        if len < self.limit {
            let slot = &mut self.slots[len];
            slot.clear();
            slot.reserve(len);
            slot
        } else {
            self.oversized = Vec::with_capacity(len);
            &mut self.oversized
        }
    }
}

impl<V> Default for ScratchPool<V> {
    fn default() -> Self {
        Self::new()
    }
}

use serde::Serialize;

use crate::error::{Result, StrataError};

/// Lifecycle of one writer buffer.
///
/// `Accepting -> FlushPending -> Flushing -> Accepting`, with `Closed`
/// reachable from any state once the writer shuts down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BufferStatus {
    Accepting,
    FlushPending,
    Flushing,
    Closed,
}

/// Counters the flush policy looks at for one buffer
#[derive(Clone, Debug, Serialize)]
pub struct BufferState {
    pub id: usize,
    pub doc_count: u32,
    pub delete_terms: u32,
    pub active_bytes: u64,
    pub status: BufferStatus,
}

impl BufferState {
    fn new(id: usize) -> Self {
        Self {
            id,
            doc_count: 0,
            delete_terms: 0,
            active_bytes: 0,
            status: BufferStatus::Accepting,
        }
    }

    fn reset(&mut self) {
        self.doc_count = 0;
        self.delete_terms = 0;
        self.active_bytes = 0;
    }
}

/// Buffer states plus the writer-wide delete queue counters.
#[derive(Debug)]
pub struct FlushControl {
    buffers: Vec<BufferState>,
    delete_terms: u32,
    delete_bytes: u64,
    apply_all_deletes: bool,
}

impl FlushControl {
    pub fn new(buffers: usize) -> Self {
        Self {
            buffers: (0..buffers).map(BufferState::new).collect(),
            delete_terms: 0,
            delete_bytes: 0,
            apply_all_deletes: false,
        }
    }

    pub fn buffers(&self) -> &[BufferState] {
        &self.buffers
    }

    pub fn buffer(&self, id: usize) -> Option<&BufferState> {
        self.buffers.get(id)
    }

    pub fn status(&self, id: usize) -> Option<BufferStatus> {
        self.buffers.get(id).map(|b| b.status)
    }

    fn buffer_mut(&mut self, id: usize) -> Result<&mut BufferState> {
        let count = self.buffers.len();
        self.buffers.get_mut(id).ok_or_else(|| {
            StrataError::InvalidRequest(format!("no buffer {} (have {})", id, count))
        })
    }

    fn transition(&mut self, id: usize, from: BufferStatus, to: BufferStatus) -> Result<()> {
        let buffer = self.buffer_mut(id)?;
        if buffer.status != from {
            return Err(StrataError::InvalidRequest(format!(
                "buffer {} is {:?}, expected {:?}",
                id, buffer.status, from
            )));
        }
        buffer.status = to;
        Ok(())
    }

    /// Count a buffered document. Only accepting buffers take inserts.
    pub fn record_insert(&mut self, id: usize, bytes: u64) -> Result<()> {
        let buffer = self.buffer_mut(id)?;
        if buffer.status != BufferStatus::Accepting {
            return Err(StrataError::InvalidRequest(format!(
                "buffer {} is {:?} and cannot take inserts",
                id, buffer.status
            )));
        }
        buffer.doc_count += 1;
        buffer.active_bytes += bytes;
        Ok(())
    }

    /// Count a buffered delete term against `id` and the delete queue
    pub fn record_delete(&mut self, id: usize, bytes: u64) -> Result<()> {
        let buffer = self.buffer_mut(id)?;
        if buffer.status == BufferStatus::Closed {
            return Err(StrataError::Closed(format!("buffer {}", id)));
        }
        buffer.delete_terms += 1;
        self.delete_terms += 1;
        self.delete_bytes += bytes;
        Ok(())
    }

    pub fn mark_flush_pending(&mut self, id: usize) -> Result<()> {
        self.transition(id, BufferStatus::Accepting, BufferStatus::FlushPending)
    }

    pub fn begin_flush(&mut self, id: usize) -> Result<()> {
        self.transition(id, BufferStatus::FlushPending, BufferStatus::Flushing)
    }

    /// Back to accepting with zeroed counters
    pub fn finish_flush(&mut self, id: usize) -> Result<()> {
        self.transition(id, BufferStatus::Flushing, BufferStatus::Accepting)?;
        self.buffer_mut(id)?.reset();
        Ok(())
    }

    pub fn close(&mut self, id: usize) -> Result<()> {
        self.buffer_mut(id)?.status = BufferStatus::Closed;
        Ok(())
    }

    pub fn close_all(&mut self) {
        for buffer in &mut self.buffers {
            buffer.status = BufferStatus::Closed;
        }
    }

    /// Buffers waiting to be flushed, lowest id first
    pub fn pending(&self) -> Vec<usize> {
        self.buffers
            .iter()
            .filter(|b| b.status == BufferStatus::FlushPending)
            .map(|b| b.id)
            .collect()
    }

    /// RAM held by buffers still taking inserts
    pub fn active_bytes(&self) -> u64 {
        self.buffers
            .iter()
            .filter(|b| b.status == BufferStatus::Accepting)
            .map(|b| b.active_bytes)
            .sum()
    }

    pub fn delete_terms(&self) -> u32 {
        self.delete_terms
    }

    pub fn delete_bytes(&self) -> u64 {
        self.delete_bytes
    }

    pub fn apply_all_deletes(&self) -> bool {
        self.apply_all_deletes
    }

    pub(crate) fn set_apply_all_deletes(&mut self) {
        self.apply_all_deletes = true;
    }

    /// Called once the delete queue has been applied
    pub fn clear_deletes(&mut self) {
        self.delete_terms = 0;
        self.delete_bytes = 0;
        self.apply_all_deletes = false;
        for buffer in &mut self.buffers {
            buffer.delete_terms = 0;
        }
    }

    /// Largest accepting buffer by active bytes; lowest id wins ties
    pub(crate) fn largest_accepting(&self) -> Option<usize> {
        self.buffers
            .iter()
            .filter(|b| b.status == BufferStatus::Accepting)
            .max_by(|a, b| a.active_bytes.cmp(&b.active_bytes).then(b.id.cmp(&a.id)))
            .map(|b| b.id)
    }

    pub(crate) fn force_pending(&mut self, id: usize) {
        if let Some(buffer) = self.buffers.get_mut(id) {
            if buffer.status == BufferStatus::Accepting {
                buffer.status = BufferStatus::FlushPending;
            }
        }
    }
}

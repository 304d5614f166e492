use std::sync::Arc;

use parking_lot::Mutex;

use super::vbyte::encode_vbyte;
use super::{FileId, StoreInner};
use crate::error::{Result, StrataError};

/// Most buffers a single `seek` may append past the allocated region
pub const MAX_SEEK_AHEAD_BUFFERS: usize = 1024;

/// Random-access writer over a store file.
///
/// The logical file length grows only when bytes are written; seeking past
/// the end allocates the buffers up to the new position but leaves the
/// length alone until something is written there.
#[derive(Debug)]
pub struct PagedOutput {
    store: Arc<Mutex<StoreInner>>,
    file: FileId,
    position: u64,
}

impl PagedOutput {
    pub(crate) fn new(store: Arc<Mutex<StoreInner>>, file: FileId) -> Self {
        Self {
            store,
            file,
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Current logical length of the file
    pub fn length(&self) -> u64 {
        let inner = self.store.lock();
        inner.files.get(&self.file).map(|e| e.length).unwrap_or(0)
    }

    /// Reposition the cursor, appending buffers if `pos` lies beyond them.
    ///
    /// A seek that would append more than [`MAX_SEEK_AHEAD_BUFFERS`] buffers
    /// fails with `OutOfRange` and leaves the cursor where it was.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        let mut inner = self.store.lock();
        let buffer_size = inner.buffer_size as u64;
        let allocated = inner
            .files
            .get(&self.file)
            .map(|e| e.buffers.len())
            .ok_or_else(|| StrataError::Closed(format!("file handle {}", self.file)))?;
        let needed = pos / buffer_size + 1;
        if needed > (allocated + MAX_SEEK_AHEAD_BUFFERS) as u64 {
            return Err(StrataError::OutOfRange {
                position: pos,
                length: allocated as u64 * buffer_size,
            });
        }
        let needed = needed as usize;
        if needed > allocated {
            inner.ensure_buffers(self.file, needed);
        }
        self.position = pos;
        Ok(())
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut inner = self.store.lock();
        let buffer_size = inner.buffer_size as u64;
        let end = self.position + data.len() as u64;
        let needed = end.div_ceil(buffer_size) as usize;
        inner.ensure_buffers(self.file, needed);

        let StoreInner { buffers, files, .. } = &mut *inner;
        let entry = files
            .get_mut(&self.file)
            .ok_or_else(|| StrataError::Closed(format!("file handle {}", self.file)))?;

        let mut written = 0usize;
        while written < data.len() {
            let pos = self.position + written as u64;
            let index = (pos / buffer_size) as usize;
            let offset = (pos % buffer_size) as usize;
            let buffer = &mut buffers[entry.buffers[index].0];
            let n = (buffer.len() - offset).min(data.len() - written);
            buffer[offset..offset + n].copy_from_slice(&data[written..written + n]);
            written += n;
        }

        self.position = end;
        entry.length = entry.length.max(end);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_vint(&mut self, value: u64) -> Result<()> {
        let mut encoded = Vec::with_capacity(10);
        encode_vbyte(value, &mut encoded);
        self.write_bytes(&encoded)
    }

    /// Length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_vint(value.len() as u64)?;
        self.write_bytes(value.as_bytes())
    }
}

impl Drop for PagedOutput {
    fn drop(&mut self) {
        self.store.lock().close_handle(self.file);
    }
}

use std::sync::Arc;

use parking_lot::Mutex;

use super::vbyte::decode_vbyte;
use super::{FileId, StoreInner};
use crate::error::{Result, StrataError};

/// Random-access reader over a store file.
///
/// The length is captured at open time; bytes appended afterwards by a
/// writer are not visible through this handle.
#[derive(Debug)]
pub struct PagedInput {
    store: Arc<Mutex<StoreInner>>,
    file: FileId,
    length: u64,
    position: u64,
}

impl PagedInput {
    pub(crate) fn new(store: Arc<Mutex<StoreInner>>, file: FileId, length: u64) -> Self {
        Self {
            store,
            file,
            length,
            position: 0,
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.length - self.position
    }

    /// Seek to `pos`; seeking to exactly `length` is allowed.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.length {
            return Err(StrataError::OutOfRange {
                position: pos,
                length: self.length,
            });
        }
        self.position = pos;
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact_into(&mut byte)?;
        Ok(byte[0])
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        self.read_exact_into(&mut out)?;
        Ok(out)
    }

    /// Fill `dst` completely or fail without moving the cursor.
    pub fn read_exact_into(&mut self, dst: &mut [u8]) -> Result<()> {
        let end = self.position + dst.len() as u64;
        if end > self.length {
            return Err(StrataError::OutOfRange {
                position: end,
                length: self.length,
            });
        }
        if dst.is_empty() {
            return Ok(());
        }

        let inner = self.store.lock();
        let buffer_size = inner.buffer_size as u64;
        let entry = inner
            .files
            .get(&self.file)
            .ok_or_else(|| StrataError::Closed(format!("file handle {}", self.file)))?;

        let mut read = 0usize;
        while read < dst.len() {
            let pos = self.position + read as u64;
            let index = (pos / buffer_size) as usize;
            let offset = (pos % buffer_size) as usize;
            let buffer = &inner.buffers[entry.buffers[index].0];
            let n = (buffer.len() - offset).min(dst.len() - read);
            dst[read..read + n].copy_from_slice(&buffer[offset..offset + n]);
            read += n;
        }

        self.position = end;
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact_into(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.read_exact_into(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_vint(&mut self) -> Result<u64> {
        // A u64 vbyte is at most 10 bytes; read them one at a time so a
        // truncated value surfaces as OutOfRange.
        let mut encoded = Vec::with_capacity(10);
        loop {
            let byte = self.read_byte()?;
            encoded.push(byte);
            if byte & 0x80 != 0 || encoded.len() == 10 {
                break;
            }
        }
        let mut pos = 0;
        decode_vbyte(&encoded, &mut pos)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| StrataError::corrupt(format!("invalid utf-8: {}", e)))
    }
}

impl Clone for PagedInput {
    /// Independent cursor over the same file
    fn clone(&self) -> Self {
        self.store.lock().open_handle(self.file);
        Self {
            store: self.store.clone(),
            file: self.file,
            length: self.length,
            position: self.position,
        }
    }
}

impl Drop for PagedInput {
    fn drop(&mut self) {
        self.store.lock().close_handle(self.file);
    }
}

//! Paged in-memory file store
//!
//! Files live in fixed-size buffers owned by the store. A file is an ordered
//! list of buffer ids plus a logical length; buffers are allocated lazily as
//! writers cross buffer boundaries and are never resized.
//!
//! # Lifetime
//!
//! Every open [`PagedOutput`] / [`PagedInput`] holds a reference on its file
//! entry. Deleting or replacing a file only unlinks the name; the buffers go
//! back to the free list once the last handle is dropped, so readers opened
//! before a delete keep seeing their bytes.
//!
//! # Concurrency
//!
//! The store itself can be shared between threads (`Clone` shares the same
//! buffers). Individual handles carry a cursor and take `&mut self`, so a
//! handle is confined to one thread at a time. Callers serialize writers per
//! file; use [`StoreLock`] for cross-writer exclusion.

mod input;
mod lock;
mod output;
mod vbyte;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StrataError};

pub use input::PagedInput;
pub use lock::{StoreLock, LOCK_POLL_INTERVAL_MS};
pub use output::PagedOutput;
pub use vbyte::{decode_vbyte, encode_vbyte};

/// Index of a buffer inside the store's buffer arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BufferId(pub(crate) usize);

pub(crate) type FileId = u64;

/// Per-file bookkeeping
#[derive(Debug)]
pub(crate) struct FileEntry {
    pub(crate) name: String,
    pub(crate) buffers: Vec<BufferId>,
    pub(crate) length: u64,
    open_handles: usize,
    unlinked: bool,
}

impl FileEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            buffers: Vec::new(),
            length: 0,
            open_handles: 0,
            unlinked: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StoreInner {
    pub(crate) buffer_size: usize,
    pub(crate) buffers: Vec<Box<[u8]>>,
    free: Vec<BufferId>,
    pub(crate) files: HashMap<FileId, FileEntry>,
    names: HashMap<String, FileId>,
    next_file_id: FileId,
    pub(crate) held_locks: HashSet<String>,
}

impl StoreInner {
    fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            buffers: Vec::new(),
            free: Vec::new(),
            files: HashMap::new(),
            names: HashMap::new(),
            next_file_id: 0,
            held_locks: HashSet::new(),
        }
    }

    fn lookup(&self, name: &str) -> Result<FileId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| StrataError::NotFound(name.to_string()))
    }

    /// Make sure `file` has at least `count` buffers, appending fresh ones.
    pub(crate) fn ensure_buffers(&mut self, file: FileId, count: usize) {
        let StoreInner {
            buffers,
            free,
            files,
            buffer_size,
            ..
        } = self;
        let Some(entry) = files.get_mut(&file) else {
            return;
        };
        while entry.buffers.len() < count {
            let id = match free.pop() {
                Some(id) => {
                    buffers[id.0].fill(0);
                    id
                }
                None => {
                    buffers.push(vec![0u8; *buffer_size].into_boxed_slice());
                    BufferId(buffers.len() - 1)
                }
            };
            entry.buffers.push(id);
        }
    }

    pub(crate) fn open_handle(&mut self, file: FileId) {
        if let Some(entry) = self.files.get_mut(&file) {
            entry.open_handles += 1;
        }
    }

    pub(crate) fn close_handle(&mut self, file: FileId) {
        let reclaim = match self.files.get_mut(&file) {
            Some(entry) => {
                entry.open_handles = entry.open_handles.saturating_sub(1);
                entry.unlinked && entry.open_handles == 0
            }
            None => false,
        };
        if reclaim {
            self.reclaim(file);
        }
    }

    fn unlink(&mut self, file: FileId) {
        let reclaim = match self.files.get_mut(&file) {
            Some(entry) => {
                entry.unlinked = true;
                entry.open_handles == 0
            }
            None => false,
        };
        if reclaim {
            self.reclaim(file);
        }
    }

    fn reclaim(&mut self, file: FileId) {
        if let Some(entry) = self.files.remove(&file) {
            debug!(
                file = %entry.name,
                buffers = entry.buffers.len(),
                "reclaiming buffers"
            );
            self.free.extend(entry.buffers);
        }
    }

    fn create(&mut self, name: &str) -> FileId {
        if let Some(old) = self.names.remove(name) {
            self.unlink(old);
        }
        let id = self.next_file_id;
        self.next_file_id += 1;
        self.files.insert(id, FileEntry::new(name));
        self.names.insert(name.to_string(), id);
        id
    }
}

/// In-memory store of named files backed by fixed-size buffers.
#[derive(Clone, Debug)]
pub struct PagedStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl PagedStore {
    /// Default buffer capacity in bytes
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;

    pub fn new(buffer_size: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(StrataError::Config(
                "buffer_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner::new(buffer_size))),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.lock().buffer_size
    }

    /// Create (or truncate) a file and return a writer positioned at 0.
    pub fn create_output(&self, name: &str) -> Result<PagedOutput> {
        if name.is_empty() {
            return Err(StrataError::InvalidRequest(
                "file name must not be empty".to_string(),
            ));
        }
        let mut inner = self.inner.lock();
        let file = inner.create(name);
        inner.open_handle(file);
        Ok(PagedOutput::new(self.inner.clone(), file))
    }

    /// Open an existing file for reading.
    pub fn open_input(&self, name: &str) -> Result<PagedInput> {
        let mut inner = self.inner.lock();
        let file = inner.lookup(name)?;
        let length = inner.files[&file].length;
        inner.open_handle(file);
        Ok(PagedInput::new(self.inner.clone(), file, length))
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.lock().names.contains_key(name)
    }

    pub fn file_length(&self, name: &str) -> Result<u64> {
        let inner = self.inner.lock();
        let file = inner.lookup(name)?;
        Ok(inner.files[&file].length)
    }

    /// Remove a file from the namespace. Open handles keep their data.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let file = inner
            .names
            .remove(name)
            .ok_or_else(|| StrataError::NotFound(name.to_string()))?;
        inner.unlink(file);
        Ok(())
    }

    /// Rename a file, replacing any existing file named `to`.
    pub fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let file = inner.lookup(from)?;
        if from == to {
            return Ok(());
        }
        if let Some(old) = inner.names.remove(to) {
            inner.unlink(old);
        }
        inner.names.remove(from);
        inner.names.insert(to.to_string(), file);
        if let Some(entry) = inner.files.get_mut(&file) {
            entry.name = to.to_string();
        }
        Ok(())
    }

    /// All live file names, sorted
    pub fn list_files(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = inner.names.keys().cloned().collect();
        names.sort();
        names
    }

    /// Bytes held by buffers that belong to some file (live or still open)
    pub fn ram_bytes_used(&self) -> u64 {
        let inner = self.inner.lock();
        ((inner.buffers.len() - inner.free.len()) * inner.buffer_size) as u64
    }

    /// Create an advisory lock scoped to this store.
    pub fn make_lock(&self, name: &str) -> StoreLock {
        StoreLock::new(self.inner.clone(), name)
    }

    /// Convenience: write a whole file in one call.
    pub fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut out = self.create_output(name)?;
        out.write_bytes(data)?;
        Ok(())
    }

    /// Convenience: read a whole file in one call.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let mut input = self.open_input(name)?;
        let len = input.length() as usize;
        input.read_bytes(len)
    }
}

impl Default for PagedStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::new(Self::DEFAULT_BUFFER_SIZE))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read_back() {
        let store = PagedStore::new(4).unwrap();
        store.write_file("a", b"hello world").unwrap();

        assert!(store.file_exists("a"));
        assert_eq!(store.file_length("a").unwrap(), 11);
        assert_eq!(store.read_file("a").unwrap(), b"hello world");
        // 11 bytes over 4-byte buffers
        assert_eq!(store.ram_bytes_used(), 12);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let store = PagedStore::new(8).unwrap();
        assert!(matches!(store.open_input("x"), Err(StrataError::NotFound(_))));
        assert!(matches!(store.file_length("x"), Err(StrataError::NotFound(_))));
        assert!(matches!(store.delete_file("x"), Err(StrataError::NotFound(_))));
        assert!(!store.file_exists("x"));
    }

    #[test]
    fn test_names_are_case_sensitive_and_flat() {
        let store = PagedStore::new(8).unwrap();
        store.write_file("Seg", b"1").unwrap();
        store.write_file("seg", b"22").unwrap();
        store.write_file("dir/seg", b"333").unwrap();

        assert_eq!(store.list_files(), vec!["Seg", "dir/seg", "seg"]);
        assert_eq!(store.file_length("Seg").unwrap(), 1);
        assert_eq!(store.file_length("dir/seg").unwrap(), 3);
    }

    #[test]
    fn test_delete_while_reader_open() {
        let store = PagedStore::new(2).unwrap();
        store.write_file("a", b"abcdef").unwrap();

        let mut input = store.open_input("a").unwrap();
        store.delete_file("a").unwrap();
        assert!(!store.file_exists("a"));
        // Buffers are still referenced by the open reader
        assert_eq!(store.ram_bytes_used(), 6);

        assert_eq!(input.read_bytes(6).unwrap(), b"abcdef");
        drop(input);
        assert_eq!(store.ram_bytes_used(), 0);
    }

    #[test]
    fn test_freed_buffers_are_reused_zeroed() {
        let store = PagedStore::new(4).unwrap();
        store.write_file("a", &[0xFF; 8]).unwrap();
        store.delete_file("a").unwrap();

        let mut out = store.create_output("b").unwrap();
        out.seek(6).unwrap();
        out.write_byte(1).unwrap();
        drop(out);

        assert_eq!(store.read_file("b").unwrap(), vec![0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_create_output_replaces_existing() {
        let store = PagedStore::new(4).unwrap();
        store.write_file("a", b"old contents").unwrap();
        let mut old_reader = store.open_input("a").unwrap();

        store.write_file("a", b"new").unwrap();
        assert_eq!(store.read_file("a").unwrap(), b"new");
        assert_eq!(old_reader.read_bytes(12).unwrap(), b"old contents");
    }

    #[test]
    fn test_rename() {
        let store = PagedStore::new(4).unwrap();
        store.write_file("tmp", b"payload").unwrap();
        store.write_file("final", b"stale").unwrap();

        store.rename_file("tmp", "final").unwrap();
        assert!(!store.file_exists("tmp"));
        assert_eq!(store.read_file("final").unwrap(), b"payload");
        assert!(matches!(
            store.rename_file("tmp", "x"),
            Err(StrataError::NotFound(_))
        ));
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        assert!(matches!(PagedStore::new(0), Err(StrataError::Config(_))));
    }
}

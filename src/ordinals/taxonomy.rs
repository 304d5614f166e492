//! Hierarchical category taxonomy
//!
//! Each category path gets an ordinal, and so does every ancestor of it.
//! Assignments are appended to `taxonomy.log` in a [`PagedStore`] as they
//! happen; `commit` records the durable prefix (length, count, crc32) in
//! `taxonomy.commit`. The ordinal cache sits in front of the log. Once the
//! cache has evicted anything, a miss falls back to scanning the log.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crc32fast::Hasher;
use tracing::{debug, info};

use super::cache::OrdinalCache;
use crate::error::{Result, StrataError};
use crate::metrics::StrataMetrics;
use crate::store::{decode_vbyte, encode_vbyte, PagedOutput, PagedStore, StoreLock};
use crate::types::Ordinal;

pub const TAXONOMY_LOG: &str = "taxonomy.log";
pub const TAXONOMY_COMMIT: &str = "taxonomy.commit";
pub const TAXONOMY_LOCK: &str = "taxonomy.lock";

/// Separator used to join path components into cache keys
pub const DEFAULT_DELIMITER: char = '\u{1F}';

/// Ordinal of the empty (root) path
pub const ROOT_ORDINAL: Ordinal = Ordinal(1);

/// A category path such as `["color", "red"]`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CategoryPath {
    components: Vec<String>,
}

impl CategoryPath {
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn new<I, S>(components: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        for c in &components {
            if c.is_empty() {
                return Err(StrataError::InvalidRequest(
                    "category path components must not be empty".to_string(),
                ));
            }
            if c.contains(DEFAULT_DELIMITER) {
                return Err(StrataError::InvalidRequest(format!(
                    "category component '{}' contains the key delimiter",
                    c.escape_debug()
                )));
            }
        }
        Ok(Self { components })
    }

    /// Parse `a/b/c` style paths
    pub fn parse(path: &str, separator: char) -> Result<Self> {
        if path.is_empty() {
            return Ok(Self::root());
        }
        Self::new(path.split(separator))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// First `n` components
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            components: self.components[..n.min(self.len())].to_vec(),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        (!self.is_root()).then(|| self.prefix(self.len() - 1))
    }

    /// Cache key: components joined by the delimiter
    pub fn key(&self) -> Vec<u8> {
        let mut buf = [0u8; 4];
        let delimiter: &str = DEFAULT_DELIMITER.encode_utf8(&mut buf);
        self.components.join(delimiter).into_bytes()
    }

    fn from_key(key: &[u8]) -> Result<Self> {
        let key = std::str::from_utf8(key)
            .map_err(|e| StrataError::corrupt(format!("taxonomy key not utf-8: {}", e)))?;
        if key.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self {
            components: key.split(DEFAULT_DELIMITER).map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.components.join("/"))
    }
}

/// One assignment in the taxonomy log
#[derive(Clone, Debug, PartialEq)]
struct Record {
    ordinal: Ordinal,
    parent: Ordinal,
    key: Vec<u8>,
}

impl Record {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_vbyte(self.ordinal.get() as u64, out);
        encode_vbyte(self.parent.get() as u64, out);
        encode_vbyte(self.key.len() as u64, out);
        out.extend_from_slice(&self.key);
    }

    fn decode(data: &[u8], pos: &mut usize) -> Result<Self> {
        let ordinal = Ordinal(decode_vbyte(data, pos)? as i32);
        let parent = Ordinal(decode_vbyte(data, pos)? as i32);
        let len = decode_vbyte(data, pos)? as usize;
        let end = *pos + len;
        if end > data.len() {
            return Err(StrataError::corrupt("taxonomy record truncated"));
        }
        let key = data[*pos..end].to_vec();
        *pos = end;
        Ok(Self {
            ordinal,
            parent,
            key,
        })
    }
}

fn decode_records(data: &[u8]) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        records.push(Record::decode(data, &mut pos)?);
    }
    Ok(records)
}

/// Durable prefix marker
#[derive(Clone, Copy, Debug)]
struct CommitPoint {
    length: u64,
    count: u32,
    crc32: u32,
}

impl CommitPoint {
    fn write(&self, store: &PagedStore) -> Result<()> {
        let mut out = store.create_output(TAXONOMY_COMMIT)?;
        out.write_u64(self.length)?;
        out.write_u32(self.count)?;
        out.write_u32(self.crc32)?;
        Ok(())
    }

    fn read(store: &PagedStore) -> Result<Option<Self>> {
        if !store.file_exists(TAXONOMY_COMMIT) {
            return Ok(None);
        }
        let mut input = store.open_input(TAXONOMY_COMMIT)?;
        Ok(Some(Self {
            length: input.read_u64()?,
            count: input.read_u32()?,
            crc32: input.read_u32()?,
        }))
    }
}

/// Load the committed records, verifying the checksum
fn load_committed(store: &PagedStore) -> Result<Vec<Record>> {
    let Some(commit) = CommitPoint::read(store)? else {
        return Ok(Vec::new());
    };
    let mut input = store.open_input(TAXONOMY_LOG)?;
    if input.length() < commit.length {
        return Err(StrataError::corrupt(format!(
            "taxonomy log is {} bytes, commit expects {}",
            input.length(),
            commit.length
        )));
    }
    let data = input.read_bytes(commit.length as usize)?;
    let mut hasher = Hasher::new();
    hasher.update(&data);
    if hasher.finalize() != commit.crc32 {
        return Err(StrataError::corrupt("taxonomy log checksum mismatch"));
    }
    let records = decode_records(&data)?;
    if records.len() != commit.count as usize {
        return Err(StrataError::corrupt(format!(
            "taxonomy commit expects {} records, found {}",
            commit.count,
            records.len()
        )));
    }
    Ok(records)
}

/// Assigns ordinals to category paths.
///
/// Holds `taxonomy.lock` for its lifetime, so there is at most one writer
/// per store.
pub struct TaxonomyWriter {
    store: PagedStore,
    cache: Arc<dyn OrdinalCache>,
    log: PagedOutput,
    crc: Hasher,
    parents: Vec<Ordinal>,
    /// `None` once every positive ordinal is assigned
    next_ordinal: Option<Ordinal>,
    cache_complete: bool,
    uncommitted: usize,
    metrics: Option<Arc<StrataMetrics>>,
    _lock: StoreLock,
}

impl TaxonomyWriter {
    pub fn open(store: PagedStore, cache: Arc<dyn OrdinalCache>, lock_timeout_ms: u64) -> Result<Self> {
        let mut lock = store.make_lock(TAXONOMY_LOCK);
        if !lock.obtain(lock_timeout_ms)? {
            return Err(StrataError::LockHeld(TAXONOMY_LOCK.to_string()));
        }

        // Uncommitted tail from a previous writer is dropped here
        let records = load_committed(&store)?;
        let mut log = store.create_output(TAXONOMY_LOG)?;
        let mut crc = Hasher::new();
        let mut bytes = Vec::new();
        for record in &records {
            record.encode(&mut bytes);
        }
        log.write_bytes(&bytes)?;
        crc.update(&bytes);

        // parents[0] is a placeholder for the absent ordinal
        let mut parents = vec![Ordinal::ABSENT];
        parents.extend(records.iter().map(|r| r.parent));

        cache.clear();
        let cache_complete = cache.has_room(records.len());
        if cache_complete {
            for record in &records {
                cache.put(&record.key, record.ordinal)?;
            }
        }

        let assigned = i32::try_from(records.len()).map_err(|_| {
            StrataError::corrupt(format!("{} holds {} records", TAXONOMY_LOG, records.len()))
        })?;
        let next_ordinal = Ordinal(assigned).checked_next();
        let mut writer = Self {
            store,
            cache,
            log,
            crc,
            parents,
            next_ordinal,
            cache_complete,
            uncommitted: 0,
            metrics: None,
            _lock: lock,
        };

        if records.is_empty() {
            writer.append(Vec::new(), Ordinal::ABSENT)?;
            writer.commit()?;
        }
        info!(
            categories = writer.size(),
            cache_complete = writer.cache_complete,
            "taxonomy writer opened"
        );
        Ok(writer)
    }

    pub fn with_metrics(mut self, metrics: Arc<StrataMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Number of ordinals assigned, root included
    pub fn size(&self) -> usize {
        self.parents.len() - 1
    }

    pub fn is_cache_complete(&self) -> bool {
        self.cache_complete
    }

    pub fn parent(&self, ordinal: Ordinal) -> Option<Ordinal> {
        if !ordinal.is_valid() {
            return None;
        }
        self.parents.get(ordinal.get() as usize).copied()
    }

    /// Ordinal of `path` if it was already added
    pub fn ordinal(&mut self, path: &CategoryPath) -> Result<Option<Ordinal>> {
        if path.is_root() {
            return Ok(Some(ROOT_ORDINAL));
        }
        let key = path.key();
        if let Some(ordinal) = self.cache.get(&key)? {
            return Ok(Some(ordinal));
        }
        if self.cache_complete {
            return Ok(None);
        }

        let found = self.scan_log(&key)?;
        if let Some(ordinal) = found {
            self.cache_put(&key, ordinal)?;
        }
        Ok(found)
    }

    /// Add `path` and any missing ancestors; returns the path's ordinal.
    pub fn add_category(&mut self, path: &CategoryPath) -> Result<Ordinal> {
        if let Some(ordinal) = self.ordinal(path)? {
            return Ok(ordinal);
        }

        // Deepest ancestor that already exists
        let mut depth = path.len() - 1;
        let mut parent = loop {
            if let Some(ordinal) = self.ordinal(&path.prefix(depth))? {
                break ordinal;
            }
            depth -= 1;
        };

        for n in depth + 1..=path.len() {
            parent = self.append(path.prefix(n).key(), parent)?;
        }
        Ok(parent)
    }

    fn append(&mut self, key: Vec<u8>, parent: Ordinal) -> Result<Ordinal> {
        let ordinal = self.next_ordinal.ok_or_else(|| {
            StrataError::InvalidRequest(format!("taxonomy is full at ordinal {}", i32::MAX))
        })?;
        let record = Record {
            ordinal,
            parent,
            key,
        };
        let mut bytes = Vec::with_capacity(record.key.len() + 8);
        record.encode(&mut bytes);
        self.log.write_bytes(&bytes)?;
        self.crc.update(&bytes);

        self.parents.push(parent);
        self.next_ordinal = ordinal.checked_next();
        self.uncommitted += 1;
        self.cache_put(&record.key, ordinal)?;
        Ok(ordinal)
    }

    fn cache_put(&mut self, key: &[u8], ordinal: Ordinal) -> Result<()> {
        if self.cache.put(key, ordinal)? {
            if let Some(metrics) = &self.metrics {
                metrics.record_eviction();
            }
            if self.cache_complete {
                debug!("ordinal cache evicted, falling back to the log for misses");
            }
            self.cache_complete = false;
            // Evicted mappings only survive in the log; make it durable now
            if self.uncommitted > 0 {
                self.commit()?;
            }
        }
        Ok(())
    }

    fn scan_log(&self, key: &[u8]) -> Result<Option<Ordinal>> {
        let mut input = self.store.open_input(TAXONOMY_LOG)?;
        let data = input.read_bytes(input.length() as usize)?;
        let mut pos = 0;
        while pos < data.len() {
            let record = Record::decode(&data, &mut pos)?;
            if record.key == key {
                return Ok(Some(record.ordinal));
            }
        }
        Ok(None)
    }

    /// Make every assignment so far durable
    pub fn commit(&mut self) -> Result<()> {
        let point = CommitPoint {
            length: self.log.position(),
            count: self.size() as u32,
            crc32: self.crc.clone().finalize(),
        };
        point.write(&self.store)?;
        debug!(
            count = point.count,
            length = point.length,
            "taxonomy committed"
        );
        self.uncommitted = 0;
        Ok(())
    }

    /// Commit, close the cache and release the lock
    pub fn close(mut self) -> Result<()> {
        self.commit()?;
        self.cache.close();
        Ok(())
    }
}

/// Read-only view of the last committed taxonomy
#[derive(Debug, Default)]
pub struct TaxonomyReader {
    paths: Vec<CategoryPath>,
    parents: Vec<Ordinal>,
    by_key: HashMap<Vec<u8>, Ordinal>,
}

impl TaxonomyReader {
    pub fn open(store: &PagedStore) -> Result<Self> {
        let records = load_committed(store)?;
        let mut reader = Self::default();
        for (i, record) in records.into_iter().enumerate() {
            if record.ordinal.get() as usize != i + 1 {
                return Err(StrataError::corrupt(format!(
                    "taxonomy ordinal {} out of sequence at record {}",
                    record.ordinal, i
                )));
            }
            reader.paths.push(CategoryPath::from_key(&record.key)?);
            reader.parents.push(record.parent);
            reader.by_key.insert(record.key, record.ordinal);
        }
        Ok(reader)
    }

    pub fn size(&self) -> usize {
        self.paths.len()
    }

    pub fn ordinal(&self, path: &CategoryPath) -> Option<Ordinal> {
        self.by_key.get(&path.key()).copied()
    }

    pub fn path(&self, ordinal: Ordinal) -> Option<&CategoryPath> {
        if !ordinal.is_valid() {
            return None;
        }
        self.paths.get(ordinal.get() as usize - 1)
    }

    pub fn parent(&self, ordinal: Ordinal) -> Option<Ordinal> {
        if !ordinal.is_valid() {
            return None;
        }
        self.parents.get(ordinal.get() as usize - 1).copied()
    }

    /// Ordinals whose parent is `ordinal`
    pub fn children(&self, ordinal: Ordinal) -> Vec<Ordinal> {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == ordinal)
            .map(|(i, _)| Ordinal(i as i32 + 1))
            .collect()
    }
}

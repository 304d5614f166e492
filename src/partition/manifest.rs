//! Partition manifest
//!
//! Commit protocol:
//! 1. Flush buffers into new `seg_N.dat` files
//! 2. Write `segments_{generation}` with its crc32 footer
//! 3. Delete the previous manifest and segments no manifest references

use std::collections::BTreeMap;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::segment::{read_checked, write_checked};
use crate::error::{Result, StrataError};
use crate::store::PagedStore;
use crate::types::{current_timestamp, SegmentId};
use crate::values::FieldKind;

pub const MANIFEST_PREFIX: &str = "segments_";

/// One live segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub id: SegmentId,
    pub doc_count: u32,
    pub checksum: u32,
    /// Positions within the segment that are deleted
    #[serde(with = "bitmap_bytes")]
    pub deletes: RoaringBitmap,
}

impl SegmentEntry {
    pub fn new(id: SegmentId, doc_count: u32, checksum: u32) -> Self {
        Self {
            id,
            doc_count,
            checksum,
            deletes: RoaringBitmap::new(),
        }
    }

    pub fn live_doc_count(&self) -> u32 {
        self.doc_count - self.deletes.len() as u32
    }

    pub fn is_deleted(&self, pos: u32) -> bool {
        self.deletes.contains(pos)
    }
}

/// Everything a reader needs to open a committed partition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionManifest {
    pub version: u32,
    pub generation: u64,
    pub next_segment_id: SegmentId,
    pub segments: Vec<SegmentEntry>,
    pub field_kinds: BTreeMap<String, FieldKind>,
    pub updated_at: u64,
}

impl PartitionManifest {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            generation: 0,
            next_segment_id: SegmentId::new(0),
            segments: Vec::new(),
            field_kinds: BTreeMap::new(),
            updated_at: 0,
        }
    }

    pub fn file_name(generation: u64) -> String {
        format!("{}{}", MANIFEST_PREFIX, generation)
    }

    pub fn allocate_segment_id(&mut self) -> SegmentId {
        let id = self.next_segment_id;
        self.next_segment_id = id.next();
        id
    }

    pub fn add_segment(&mut self, entry: SegmentEntry) {
        self.segments.push(entry);
        self.updated_at = current_timestamp();
    }

    pub fn get_segment(&self, id: SegmentId) -> Option<&SegmentEntry> {
        self.segments.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.get_segment(id).is_some()
    }

    pub fn total_doc_count(&self) -> u64 {
        self.segments.iter().map(|e| e.doc_count as u64).sum()
    }

    pub fn live_doc_count(&self) -> u64 {
        self.segments.iter().map(|e| e.live_doc_count() as u64).sum()
    }

    pub fn has_deletes(&self) -> bool {
        self.segments.iter().any(|e| !e.deletes.is_empty())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Highest committed generation in `store`, if any
    pub fn latest_generation(store: &PagedStore) -> Option<u64> {
        store
            .list_files()
            .iter()
            .filter_map(|name| name.strip_prefix(MANIFEST_PREFIX)?.parse::<u64>().ok())
            .max()
    }

    /// Load the latest committed manifest, or an empty one
    pub fn load_latest(store: &PagedStore) -> Result<Self> {
        match Self::latest_generation(store) {
            Some(generation) => Self::load(store, generation),
            None => Ok(Self::new()),
        }
    }

    pub fn load(store: &PagedStore, generation: u64) -> Result<Self> {
        let name = Self::file_name(generation);
        let bytes = read_checked(store, &name)?;
        let manifest: Self = bincode::deserialize(&bytes)
            .map_err(|e| StrataError::corrupt(format!("{} does not decode: {}", name, e)))?;
        if manifest.generation != generation {
            return Err(StrataError::corrupt(format!(
                "{} claims generation {}",
                name, manifest.generation
            )));
        }
        Ok(manifest)
    }

    pub fn save(&self, store: &PagedStore) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        write_checked(store, &Self::file_name(self.generation), &bytes)?;
        Ok(())
    }
}

impl Default for PartitionManifest {
    fn default() -> Self {
        Self::new()
    }
}

mod bitmap_bytes {
    use roaring::RoaringBitmap;
    use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bitmap: &RoaringBitmap, s: S) -> Result<S::Ok, S::Error> {
        let mut bytes = Vec::with_capacity(bitmap.serialized_size());
        bitmap.serialize_into(&mut bytes).map_err(S::Error::custom)?;
        s.serialize_bytes(&bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<RoaringBitmap, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(d)?;
        RoaringBitmap::deserialize_from(&bytes[..]).map_err(D::Error::custom)
    }
}

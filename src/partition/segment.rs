//! Segment files
//!
//! Layout: bincode-encoded `Vec<Document>` followed by a little-endian
//! crc32 of those bytes.

use crc32fast::Hasher;

use super::Document;
use crate::error::{Result, StrataError};
use crate::store::PagedStore;
use crate::types::SegmentId;

const FOOTER_LEN: usize = 4;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Write `data` plus its crc32 footer; returns the checksum
pub(crate) fn write_checked(store: &PagedStore, name: &str, data: &[u8]) -> Result<u32> {
    let crc = checksum(data);
    let mut out = store.create_output(name)?;
    out.write_bytes(data)?;
    out.write_u32(crc)?;
    Ok(crc)
}

/// Read a file written by [`write_checked`], verifying the footer
pub(crate) fn read_checked(store: &PagedStore, name: &str) -> Result<Vec<u8>> {
    let mut bytes = store.read_file(name)?;
    if bytes.len() < FOOTER_LEN {
        return Err(StrataError::corrupt(format!("{} is too short", name)));
    }
    let split = bytes.len() - FOOTER_LEN;
    let mut footer = [0u8; FOOTER_LEN];
    footer.copy_from_slice(&bytes[split..]);
    bytes.truncate(split);
    if checksum(&bytes) != u32::from_le_bytes(footer) {
        return Err(StrataError::corrupt(format!("{} checksum mismatch", name)));
    }
    Ok(bytes)
}

/// Persist a segment; returns its checksum
pub fn write_segment(store: &PagedStore, id: SegmentId, docs: &[Document]) -> Result<u32> {
    let data = bincode::serialize(docs)?;
    write_checked(store, &id.file_name(), &data)
}

pub fn read_segment(store: &PagedStore, id: SegmentId) -> Result<Vec<Document>> {
    let data = read_checked(store, &id.file_name())?;
    bincode::deserialize(&data)
        .map_err(|e| StrataError::corrupt(format!("{} does not decode: {}", id, e)))
}

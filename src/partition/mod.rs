//! Partition: buffered documents flushed into segments inside a PagedStore
//!
//! A [`PartitionWriter`] shards incoming documents across in-memory
//! buffers watched by the flush policy. Flushed buffers become immutable
//! `seg_N.dat` files; `commit` publishes them through a generation-numbered
//! `segments_N` manifest that also carries per-segment delete bitmaps.
//! A [`PartitionReader`] opens the latest manifest and builds field value
//! caches over the live documents.

mod buffer;
mod manifest;
mod reader;
mod segment;
mod writer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::types::DocumentKey;
use crate::values::{FieldKind, FieldValue};

pub use buffer::DocumentBuffer;
pub use manifest::{PartitionManifest, SegmentEntry, MANIFEST_PREFIX};
pub use reader::PartitionReader;
pub use segment::{read_segment, write_segment};
pub use writer::{PartitionWriter, WRITE_LOCK};

/// A document: an id plus typed, possibly multi-valued fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentKey,
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<FieldValue>>,
}

impl Document {
    pub fn new(id: impl Into<DocumentKey>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.add_field(name, value);
        self
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.entry(name.into()).or_default().push(value);
    }

    pub fn values(&self, field: &str) -> &[FieldValue] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check the id and that every field holds a single kind.
    /// Returns the kind of each field.
    pub fn field_kinds(&self) -> Result<BTreeMap<String, FieldKind>> {
        if self.id.is_empty() {
            return Err(StrataError::InvalidRequest(
                "document id must not be empty".to_string(),
            ));
        }
        let mut kinds = BTreeMap::new();
        for (name, values) in &self.fields {
            let Some(first) = values.first() else {
                continue;
            };
            let kind = first.kind();
            if let Some(other) = values.iter().find(|v| v.kind() != kind) {
                return Err(StrataError::InvalidRequest(format!(
                    "field '{}' of document '{}' mixes {:?} and {:?}",
                    name,
                    self.id,
                    kind,
                    other.kind()
                )));
            }
            kinds.insert(name.clone(), kind);
        }
        Ok(kinds)
    }

    /// Estimated RAM held while buffered
    pub fn ram_bytes(&self) -> u64 {
        let fields: usize = self
            .fields
            .iter()
            .map(|(name, values)| {
                name.len() + values.iter().map(FieldValue::ram_bytes).sum::<usize>()
            })
            .sum();
        (std::mem::size_of::<Document>() + self.id.len() + fields) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_kinds() {
        let doc = Document::new("a")
            .with_field("price", FieldValue::Long(3))
            .with_field("price", FieldValue::Long(4))
            .with_field("tag", FieldValue::Keyword("x".into()));
        let kinds = doc.field_kinds().unwrap();
        assert_eq!(kinds["price"], FieldKind::Long);
        assert_eq!(kinds["tag"], FieldKind::Keyword);
        assert_eq!(doc.values("price").len(), 2);
        assert!(doc.values("missing").is_empty());
    }

    #[test]
    fn test_invalid_documents() {
        assert!(Document::new("").field_kinds().is_err());
        let mixed = Document::new("a")
            .with_field("f", FieldValue::Long(1))
            .with_field("f", FieldValue::Double(1.0));
        assert!(matches!(
            mixed.field_kinds(),
            Err(StrataError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_json_shape() {
        let doc: Document =
            serde_json::from_str(r#"{"id":"p1","fields":{"price":[{"long":12}]}}"#).unwrap();
        assert_eq!(doc.values("price"), &[FieldValue::Long(12)]);
    }
}

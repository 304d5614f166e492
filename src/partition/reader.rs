use std::collections::HashMap;

use super::manifest::PartitionManifest;
use super::segment::read_segment;
use super::Document;
use crate::error::{Result, StrataError};
use crate::store::PagedStore;
use crate::types::DocId;
use crate::values::{FieldKind, FieldValueCache, FieldValueCacheBuilder};

/// Point-in-time view of the last committed generation.
///
/// Live documents are numbered `0..doc_count` in segment order; those
/// numbers are the doc ids of the field value caches built here.
#[derive(Debug)]
pub struct PartitionReader {
    manifest: PartitionManifest,
    docs: Vec<Document>,
    by_id: HashMap<String, DocId>,
}

impl PartitionReader {
    pub fn open(store: &PagedStore) -> Result<Self> {
        let manifest = PartitionManifest::load_latest(store)?;
        let mut docs = Vec::with_capacity(manifest.live_doc_count() as usize);
        for entry in &manifest.segments {
            let segment = read_segment(store, entry.id)?;
            if segment.len() != entry.doc_count as usize {
                return Err(StrataError::corrupt(format!(
                    "{} holds {} documents, manifest says {}",
                    entry.id,
                    segment.len(),
                    entry.doc_count
                )));
            }
            docs.extend(
                segment
                    .into_iter()
                    .enumerate()
                    .filter(|(pos, _)| !entry.is_deleted(*pos as u32))
                    .map(|(_, doc)| doc),
            );
        }

        // Later segments hold newer versions
        let by_id = docs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), DocId(i as u32)))
            .collect();
        Ok(Self {
            manifest,
            docs,
            by_id,
        })
    }

    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    pub fn segment_count(&self) -> usize {
        self.manifest.segment_count()
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn document(&self, doc: DocId) -> Option<&Document> {
        self.docs.get(doc.as_usize())
    }

    pub fn doc_id(&self, id: &str) -> Option<DocId> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.doc_id(id).and_then(|doc| self.document(doc))
    }

    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.manifest.field_kinds.get(field).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.manifest
            .field_kinds
            .iter()
            .map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Build the value cache of `field` over the live documents
    pub fn field_values(&self, field: &str) -> Result<FieldValueCache> {
        let kind = self
            .field_kind(field)
            .ok_or_else(|| StrataError::NotFound(format!("field '{}'", field)))?;
        let mut builder = FieldValueCacheBuilder::new(field, kind);
        builder.set_max_doc(self.docs.len() as u32);
        for (i, doc) in self.docs.iter().enumerate() {
            for value in doc.values(field) {
                builder
                    .add(DocId(i as u32), value)
                    .map_err(|e| StrataError::corrupt(format!("committed {}", e)))?;
            }
        }
        Ok(builder.build())
    }
}

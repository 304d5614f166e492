use super::Document;
use crate::types::DocumentKey;

/// In-memory documents waiting to be flushed
///
/// Writers shard documents by `hash(id)`, so every version of one id lands
/// in the same buffer and an in-buffer delete only has to look here.
#[derive(Debug, Default)]
pub struct DocumentBuffer {
    docs: Vec<Document>,
    size_bytes: u64,
}

impl DocumentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, doc: Document) -> u64 {
        let bytes = doc.ram_bytes();
        self.size_bytes += bytes;
        self.docs.push(doc);
        bytes
    }

    /// Drop buffered documents with this id; returns how many went
    pub fn delete(&mut self, id: &DocumentKey) -> usize {
        let before = self.docs.len();
        self.docs.retain(|d| &d.id != id);
        before - self.docs.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.iter().any(|d| d.id == id)
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Hand the documents over for flushing and reset
    pub fn take(&mut self) -> Vec<Document> {
        self.size_bytes = 0;
        std::mem::take(&mut self.docs)
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.size_bytes = 0;
    }
}

/// Buffer index for a document id
pub(crate) fn shard_for(id: &str, shards: usize) -> usize {
    crc32fast::hash(id.as_bytes()) as usize % shards.max(1)
}

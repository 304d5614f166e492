//! Doc → value-slot maps
//!
//! Slots are 1-based indexes into the cache's sorted term table; slot 0
//! means "no value". Per document, slots are sorted and unique.

use std::fmt;

use crate::types::DocId;

/// Maps a document to the slots of the values it holds.
pub trait DocOrdinals: Send + Sync + fmt::Debug {
    /// Number of documents covered (docs at or past this hold no value)
    fn max_doc(&self) -> u32;

    /// Slots for `doc`, empty if it has no value
    fn ordinals(&self, doc: DocId) -> &[u32];

    fn is_multi_valued(&self) -> bool;

    fn ram_bytes_used(&self) -> usize;

    fn has_value(&self, doc: DocId) -> bool {
        !self.ordinals(doc).is_empty()
    }
}

/// At most one value per document: one slot per doc
#[derive(Clone, Debug)]
pub struct SingleValueOrdinals {
    slots: Vec<u32>,
}

impl SingleValueOrdinals {
    pub fn new(slots: Vec<u32>) -> Self {
        Self { slots }
    }
}

impl DocOrdinals for SingleValueOrdinals {
    fn max_doc(&self) -> u32 {
        self.slots.len() as u32
    }

    fn ordinals(&self, doc: DocId) -> &[u32] {
        match self.slots.get(doc.as_usize()) {
            Some(slot) if *slot != 0 => std::slice::from_ref(slot),
            _ => &[],
        }
    }

    fn is_multi_valued(&self) -> bool {
        false
    }

    fn ram_bytes_used(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<u32>()
    }
}

/// Any number of values per document: offsets into a flat slot array
#[derive(Clone, Debug)]
pub struct MultiValueOrdinals {
    /// `offsets[doc]..offsets[doc + 1]` is the doc's range in `slots`
    offsets: Vec<u32>,
    slots: Vec<u32>,
}

impl MultiValueOrdinals {
    pub fn from_docs(per_doc: &[Vec<u32>]) -> Self {
        let mut offsets = Vec::with_capacity(per_doc.len() + 1);
        let mut slots = Vec::with_capacity(per_doc.iter().map(Vec::len).sum());
        offsets.push(0);
        for doc_slots in per_doc {
            slots.extend_from_slice(doc_slots);
            offsets.push(slots.len() as u32);
        }
        Self { offsets, slots }
    }
}

impl DocOrdinals for MultiValueOrdinals {
    fn max_doc(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    fn ordinals(&self, doc: DocId) -> &[u32] {
        let d = doc.as_usize();
        if d + 1 >= self.offsets.len() {
            return &[];
        }
        &self.slots[self.offsets[d] as usize..self.offsets[d + 1] as usize]
    }

    fn is_multi_valued(&self) -> bool {
        true
    }

    fn ram_bytes_used(&self) -> usize {
        (self.offsets.capacity() + self.slots.capacity()) * std::mem::size_of::<u32>()
    }
}

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::field::{decode_as_date, decode_as_double, decode_value, FieldKind, FieldValue};
use super::ordinals::{DocOrdinals, MultiValueOrdinals, SingleValueOrdinals};
use super::scratch::ScratchPool;
use crate::error::{Result, StrataError};
use crate::types::DocId;

/// Per-document decoded values of one field.
///
/// Values are kept once, sorted, in a term table; documents point at them
/// through a [`DocOrdinals`] strategy chosen at build time. The cache is
/// immutable and can be shared across threads; callers bring their own
/// [`ScratchPool`] for results.
#[derive(Debug)]
pub struct FieldValueCache {
    field: String,
    kind: FieldKind,
    terms: Vec<Bytes>,
    ordinals: Box<dyn DocOrdinals>,
}

impl FieldValueCache {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn max_doc(&self) -> u32 {
        self.ordinals.max_doc()
    }

    pub fn is_multi_valued(&self) -> bool {
        self.ordinals.is_multi_valued()
    }

    /// Number of distinct values
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn has_value(&self, doc: DocId) -> bool {
        self.ordinals.has_value(doc)
    }

    /// Term slots held by `doc` (1-based into the sorted term table)
    pub fn ordinals(&self, doc: DocId) -> &[u32] {
        self.ordinals.ordinals(doc)
    }

    /// Encoded value for a slot
    pub fn term(&self, slot: u32) -> Option<&Bytes> {
        slot.checked_sub(1)
            .and_then(|i| self.terms.get(i as usize))
    }

    /// Slot of an encoded value, if any document holds it
    pub fn lookup_term(&self, encoded: &[u8]) -> Option<u32> {
        self.terms
            .binary_search_by(|t| t.as_ref().cmp(encoded))
            .ok()
            .map(|i| i as u32 + 1)
    }

    /// Encoded values of `doc`, in sorted order. Empty if it has none.
    pub fn values_for<'p>(&self, doc: DocId, pool: &'p mut ScratchPool<Bytes>) -> &'p [Bytes] {
        let slots = self.ordinals.ordinals(doc);
        let out = pool.take(slots.len());
        for &slot in slots {
            out.push(self.terms[slot as usize - 1].clone());
        }
        out.as_slice()
    }

    /// Allocating variant of [`values_for`](Self::values_for)
    pub fn values(&self, doc: DocId) -> Vec<Bytes> {
        self.ordinals
            .ordinals(doc)
            .iter()
            .map(|&slot| self.terms[slot as usize - 1].clone())
            .collect()
    }

    /// Typed values of `doc`
    pub fn typed_values(&self, doc: DocId) -> Result<Vec<FieldValue>> {
        self.ordinals
            .ordinals(doc)
            .iter()
            .map(|&slot| decode_value(self.kind, &self.terms[slot as usize - 1]))
            .collect()
    }

    /// Numeric projection, decoded on access
    pub fn doubles_for<'p>(&self, doc: DocId, pool: &'p mut ScratchPool<f64>) -> Result<&'p [f64]> {
        let slots = self.ordinals.ordinals(doc);
        let out = pool.take(slots.len());
        for &slot in slots {
            out.push(decode_as_double(self.kind, &self.terms[slot as usize - 1])?);
        }
        Ok(out.as_slice())
    }

    /// Temporal projection, decoded on access
    pub fn dates_for<'p>(
        &self,
        doc: DocId,
        pool: &'p mut ScratchPool<DateTime<Utc>>,
    ) -> Result<&'p [DateTime<Utc>]> {
        let slots = self.ordinals.ordinals(doc);
        let out = pool.take(slots.len());
        for &slot in slots {
            out.push(decode_as_date(self.kind, &self.terms[slot as usize - 1])?);
        }
        Ok(out.as_slice())
    }

    pub fn ram_bytes_used(&self) -> usize {
        self.ordinals.ram_bytes_used()
            + self
                .terms
                .iter()
                .map(|t| t.len() + std::mem::size_of::<Bytes>())
                .sum::<usize>()
    }
}

/// Collects a field's values document by document and builds the cache.
#[derive(Debug)]
pub struct FieldValueCacheBuilder {
    field: String,
    kind: FieldKind,
    per_doc: Vec<Vec<Bytes>>,
}

impl FieldValueCacheBuilder {
    pub fn new(field: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            field: field.into(),
            kind,
            per_doc: Vec::new(),
        }
    }

    /// Make sure docs below `max_doc` are covered even without values
    pub fn set_max_doc(&mut self, max_doc: u32) {
        if self.per_doc.len() < max_doc as usize {
            self.per_doc.resize_with(max_doc as usize, Vec::new);
        }
    }

    pub fn add(&mut self, doc: DocId, value: &FieldValue) -> Result<()> {
        if value.kind() != self.kind {
            return Err(StrataError::InvalidRequest(format!(
                "field '{}' holds {:?} values, got {:?}",
                self.field,
                self.kind,
                value.kind()
            )));
        }
        self.set_max_doc(doc.as_u32() + 1);
        self.per_doc[doc.as_usize()].push(value.encode());
        Ok(())
    }

    pub fn build(self) -> FieldValueCache {
        let mut terms: Vec<Bytes> = self.per_doc.iter().flatten().cloned().collect();
        terms.sort();
        terms.dedup();

        let slot_of = |value: &Bytes| -> u32 {
            // Every value came from `terms`, so the search always hits
            terms.binary_search(value).map(|i| i as u32 + 1).unwrap_or(0)
        };

        let mut doc_slots: Vec<Vec<u32>> = Vec::with_capacity(self.per_doc.len());
        let mut multi = false;
        for values in &self.per_doc {
            let mut slots: Vec<u32> = values.iter().map(slot_of).collect();
            slots.sort_unstable();
            slots.dedup();
            multi |= slots.len() > 1;
            doc_slots.push(slots);
        }

        let ordinals: Box<dyn DocOrdinals> = if multi {
            Box::new(MultiValueOrdinals::from_docs(&doc_slots))
        } else {
            Box::new(SingleValueOrdinals::new(
                doc_slots
                    .iter()
                    .map(|s| s.first().copied().unwrap_or(0))
                    .collect(),
            ))
        };

        FieldValueCache {
            field: self.field,
            kind: self.kind,
            terms,
            ordinals,
        }
    }
}

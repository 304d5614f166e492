use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::buffer::{shard_for, DocumentBuffer};
use super::manifest::{PartitionManifest, SegmentEntry};
use super::segment::{read_segment, write_segment};
use super::Document;
use crate::config::StrataConfig;
use crate::error::{Result, StrataError};
use crate::flush::{FlushControl, FlushDecision, FlushPolicy};
use crate::metrics::StrataMetrics;
use crate::store::{PagedStore, StoreLock};
use crate::types::{DocumentKey, SegmentId};
use crate::values::FieldKind;

/// Lock every writer of a partition store holds while open
pub const WRITE_LOCK: &str = "write.lock";

/// Per-term bookkeeping overhead charged to the delete queue
const DELETE_TERM_OVERHEAD: u64 = 48;

/// A delete waiting to be applied to flushed segments.
/// Only segments older than `before` can hold the deleted documents; newer
/// ones were written after the delete and are unaffected.
#[derive(Clone, Debug)]
struct PendingDelete {
    id: DocumentKey,
    before: SegmentId,
}

/// Single writer over one partition store.
///
/// Holds `write.lock` from `open` until the writer is closed, rolled back
/// or dropped. Changes become visible to readers on `commit`.
pub struct PartitionWriter {
    store: PagedStore,
    config: StrataConfig,
    policy: FlushPolicy,
    control: FlushControl,
    shards: Vec<DocumentBuffer>,
    manifest: PartitionManifest,
    committed: PartitionManifest,
    pending_deletes: Vec<PendingDelete>,
    segment_ids: HashMap<SegmentId, Vec<DocumentKey>>,
    obsolete: Vec<SegmentId>,
    batch_mode: bool,
    metrics: Option<Arc<StrataMetrics>>,
    _lock: StoreLock,
}

impl PartitionWriter {
    pub fn open(
        store: PagedStore,
        config: StrataConfig,
        metrics: Option<Arc<StrataMetrics>>,
    ) -> Result<Self> {
        config.validate()?;
        let mut lock = store.make_lock(WRITE_LOCK);
        if !lock.obtain(config.writer.lock_timeout_ms)? {
            return Err(StrataError::LockHeld(WRITE_LOCK.to_string()));
        }

        let committed = PartitionManifest::load_latest(&store)?;
        let shards = config.writer.buffer_shards.max(1);
        info!(
            generation = committed.generation,
            segments = committed.segment_count(),
            shards,
            "partition writer opened"
        );

        Ok(Self {
            policy: FlushPolicy::new(config.flush.clone()),
            control: FlushControl::new(shards),
            shards: (0..shards).map(|_| DocumentBuffer::new()).collect(),
            manifest: committed.clone(),
            committed,
            pending_deletes: Vec::new(),
            segment_ids: HashMap::new(),
            obsolete: Vec::new(),
            batch_mode: false,
            metrics,
            store,
            config,
            _lock: lock,
        })
    }

    /// Batch mode skips the commit that normally follows a policy flush
    pub fn set_batch_mode(&mut self, batch: bool) {
        self.batch_mode = batch;
    }

    pub fn is_batch_mode(&self) -> bool {
        self.batch_mode
    }

    pub fn control(&self) -> &FlushControl {
        &self.control
    }

    pub fn committed_generation(&self) -> u64 {
        self.committed.generation
    }

    /// Documents buffered in memory, not yet in a segment
    pub fn buffered_docs(&self) -> usize {
        self.shards.iter().map(DocumentBuffer::doc_count).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.manifest.segment_count()
    }

    pub fn pending_delete_count(&self) -> usize {
        self.pending_deletes.len()
    }

    /// Check a document against the partition's field kinds.
    /// Nothing is modified if this fails.
    fn validate(&self, doc: &Document) -> Result<BTreeMap<String, FieldKind>> {
        let kinds = doc.field_kinds()?;
        for (name, kind) in &kinds {
            if let Some(existing) = self.manifest.field_kinds.get(name) {
                if existing != kind {
                    return Err(StrataError::InvalidRequest(format!(
                        "field '{}' holds {:?} values, document '{}' has {:?}",
                        name, existing, doc.id, kind
                    )));
                }
            }
        }
        Ok(kinds)
    }

    fn buffer(&mut self, doc: Document, kinds: BTreeMap<String, FieldKind>) -> Result<usize> {
        let shard = shard_for(&doc.id, self.shards.len());
        self.manifest.field_kinds.extend(kinds);
        let bytes = self.shards[shard].add(doc);
        self.control.record_insert(shard, bytes)?;
        Ok(shard)
    }

    fn queue_delete(&mut self, id: &DocumentKey) -> Result<()> {
        let shard = shard_for(id, self.shards.len());
        let dropped = self.shards[shard].delete(id);
        self.pending_deletes.push(PendingDelete {
            id: id.clone(),
            before: self.manifest.next_segment_id,
        });
        self.control
            .record_delete(shard, id.len() as u64 + DELETE_TERM_OVERHEAD)?;
        debug!(id = %id, buffered_dropped = dropped, "delete queued");
        Ok(())
    }

    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        let kinds = self.validate(&doc)?;
        let shard = self.buffer(doc, kinds)?;
        let decision = self.policy.on_insert(&mut self.control, shard);
        self.act_on(decision)
    }

    /// Replace every document with `id` by `doc`
    pub fn update_document(&mut self, id: &DocumentKey, doc: Document) -> Result<()> {
        if &doc.id != id {
            return Err(StrataError::InvalidRequest(format!(
                "update of '{}' carries document '{}'",
                id, doc.id
            )));
        }
        let kinds = self.validate(&doc)?;
        self.queue_delete(id)?;
        let shard = self.buffer(doc, kinds)?;
        let decision = self.policy.on_update(&mut self.control, shard);
        self.act_on(decision)
    }

    /// Delete every document with `id`. Unknown ids are not an error.
    pub fn delete_document(&mut self, id: &DocumentKey) -> Result<()> {
        if id.is_empty() {
            return Err(StrataError::InvalidRequest(
                "document id must not be empty".to_string(),
            ));
        }
        self.queue_delete(id)?;
        let decision = self.policy.on_delete(&mut self.control);
        self.act_on(decision)
    }

    fn act_on(&mut self, decision: FlushDecision) -> Result<()> {
        if decision.apply_deletes {
            self.apply_deletes()?;
        }
        if decision.flush.is_some() {
            let flushed = self.flush_pending()?;
            if flushed > 0 && self.config.writer.auto_commit_on_flush && !self.batch_mode {
                self.commit()?;
            }
        }
        Ok(())
    }

    /// Flush every `FlushPending` buffer; returns segments written
    fn flush_pending(&mut self) -> Result<usize> {
        let mut written = 0;
        for shard in self.control.pending() {
            self.control.begin_flush(shard)?;
            let docs = self.shards[shard].take();
            if !docs.is_empty() {
                self.write_new_segment(docs)?;
                written += 1;
            }
            self.control.finish_flush(shard)?;
        }
        Ok(written)
    }

    fn write_new_segment(&mut self, docs: Vec<Document>) -> Result<SegmentId> {
        let id = self.manifest.allocate_segment_id();
        let checksum = write_segment(&self.store, id, &docs)?;
        let doc_count = docs.len() as u32;
        self.manifest
            .add_segment(SegmentEntry::new(id, doc_count, checksum));
        self.segment_ids
            .insert(id, docs.into_iter().map(|d| d.id).collect());

        debug!(segment = %id, docs = doc_count, "segment flushed");
        if let Some(metrics) = &self.metrics {
            metrics.record_flush(doc_count as usize);
            metrics.set_store_ram(self.store.ram_bytes_used());
        }
        Ok(id)
    }

    fn doc_ids(&mut self, id: SegmentId) -> Result<&[DocumentKey]> {
        if !self.segment_ids.contains_key(&id) {
            let ids = read_segment(&self.store, id)?
                .into_iter()
                .map(|d| d.id)
                .collect();
            self.segment_ids.insert(id, ids);
        }
        Ok(self.segment_ids.get(&id).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Apply queued deletes to the flushed segments
    pub fn apply_deletes(&mut self) -> Result<()> {
        if self.pending_deletes.is_empty() {
            self.control.clear_deletes();
            return Ok(());
        }
        let deletes = std::mem::take(&mut self.pending_deletes);
        let targets: Vec<SegmentId> = self.manifest.segments.iter().map(|e| e.id).collect();

        let mut applied = 0u64;
        for segment in targets {
            let positions: Vec<u32> = {
                let ids = self.doc_ids(segment)?;
                ids.iter()
                    .enumerate()
                    .filter(|(_, doc_id)| {
                        deletes
                            .iter()
                            .any(|d| segment < d.before && &d.id == *doc_id)
                    })
                    .map(|(pos, _)| pos as u32)
                    .collect()
            };
            if let Some(entry) = self.manifest.segments.iter_mut().find(|e| e.id == segment) {
                for pos in positions {
                    if entry.deletes.insert(pos) {
                        applied += 1;
                    }
                }
            }
        }
        self.control.clear_deletes();
        debug!(terms = deletes.len(), docs = applied, "deletes applied");
        Ok(())
    }

    /// Flush every non-empty buffer and apply the delete queue.
    /// Returns the number of segments written.
    pub fn flush(&mut self) -> Result<usize> {
        for shard in 0..self.shards.len() {
            if !self.shards[shard].is_empty() {
                self.control.force_pending(shard);
            }
        }
        let written = self.flush_pending()?;
        self.apply_deletes()?;
        Ok(written)
    }

    /// Publish everything written so far as a new manifest generation
    pub fn commit(&mut self) -> Result<u64> {
        self.flush()?;
        if self.manifest == self.committed && self.obsolete.is_empty() {
            return Ok(self.committed.generation);
        }

        let previous = self.committed.generation;
        self.manifest.generation = previous + 1;
        self.manifest.save(&self.store)?;

        if previous > 0 {
            self.delete_quietly(&PartitionManifest::file_name(previous));
        }
        for id in std::mem::take(&mut self.obsolete) {
            self.segment_ids.remove(&id);
            self.delete_quietly(&id.file_name());
        }
        self.committed = self.manifest.clone();

        info!(
            generation = self.committed.generation,
            segments = self.committed.segment_count(),
            live_docs = self.committed.live_doc_count(),
            "partition committed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_commit(self.committed.segment_count());
            metrics.set_store_ram(self.store.ram_bytes_used());
        }
        Ok(self.committed.generation)
    }

    fn delete_quietly(&self, name: &str) {
        if let Err(e) = self.store.delete_file(name) {
            warn!(file = name, error = %e, "could not delete obsolete file");
        }
    }

    /// Merge all segments into one, dropping deleted documents, and
    /// commit. Returns whether anything was merged.
    pub fn optimize(&mut self) -> Result<bool> {
        self.flush()?;
        if self.manifest.segment_count() < 2 && !self.manifest.has_deletes() {
            return Ok(false);
        }

        let mut live = Vec::new();
        for entry in &self.manifest.segments {
            for (pos, doc) in read_segment(&self.store, entry.id)?.into_iter().enumerate() {
                if !entry.is_deleted(pos as u32) {
                    live.push(doc);
                }
            }
        }

        let merged: Vec<SegmentId> = self.manifest.segments.drain(..).map(|e| e.id).collect();
        let merged_count = merged.len();
        // Segments the committed manifest never saw can go right away
        for id in merged {
            if self.committed.contains(id) {
                self.obsolete.push(id);
            } else {
                self.segment_ids.remove(&id);
                self.delete_quietly(&id.file_name());
            }
        }
        if !live.is_empty() {
            self.write_new_segment(live)?;
        }

        info!(merged = merged_count, "partition optimized");
        self.commit()?;
        if let Some(metrics) = &self.metrics {
            metrics.record_optimize();
        }
        Ok(true)
    }

    /// Throw away everything since the last commit and release the lock
    pub fn rollback(mut self) -> Result<()> {
        let uncommitted: Vec<SegmentId> = self
            .manifest
            .segments
            .iter()
            .map(|e| e.id)
            .chain(self.obsolete.iter().copied())
            .filter(|id| !self.committed.contains(*id))
            .collect();
        // Merged segments already deleted by optimize are gone
        for id in uncommitted {
            if self.store.file_exists(&id.file_name()) {
                self.store.delete_file(&id.file_name())?;
            }
        }
        for shard in &mut self.shards {
            shard.clear();
        }
        self.pending_deletes.clear();
        self.control.close_all();
        self.manifest = self.committed.clone();

        info!(generation = self.committed.generation, "partition writer rolled back");
        if let Some(metrics) = &self.metrics {
            metrics.record_rollback();
        }
        Ok(())
    }

    /// Commit and release the lock
    pub fn close(mut self) -> Result<u64> {
        let generation = self.commit()?;
        self.control.close_all();
        info!(generation, "partition writer closed");
        Ok(generation)
    }
}

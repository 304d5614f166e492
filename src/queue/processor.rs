use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::StrataConfig;
use crate::error::{Result, StrataError};
use crate::metrics::StrataMetrics;
use crate::partition::{Document, PartitionWriter};
use crate::store::PagedStore;
use crate::types::DocumentKey;

/// A mutation to apply to a partition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WorkOp {
    Add { doc: Document },
    Update { id: DocumentKey, doc: Document },
    Delete { id: DocumentKey },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    Add,
    Update,
    Delete,
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::Add => "add",
            WorkKind::Update => "update",
            WorkKind::Delete => "delete",
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkOp {
    pub fn kind(&self) -> WorkKind {
        match self {
            WorkOp::Add { .. } => WorkKind::Add,
            WorkOp::Update { .. } => WorkKind::Update,
            WorkOp::Delete { .. } => WorkKind::Delete,
        }
    }

    pub fn apply(self, writer: &mut PartitionWriter) -> Result<()> {
        match self {
            WorkOp::Add { doc } => writer.add_document(doc),
            WorkOp::Update { id, doc } => writer.update_document(&id, doc),
            WorkOp::Delete { id } => writer.delete_document(&id),
        }
    }
}

/// Queued work item. One batch item puts the whole run in batch mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(flatten)]
    pub op: WorkOp,
    #[serde(default)]
    pub batch: bool,
}

impl WorkItem {
    pub fn add(doc: Document) -> Self {
        Self {
            op: WorkOp::Add { doc },
            batch: false,
        }
    }

    pub fn update(id: impl Into<DocumentKey>, doc: Document) -> Self {
        Self {
            op: WorkOp::Update { id: id.into(), doc },
            batch: false,
        }
    }

    pub fn delete(id: impl Into<DocumentKey>) -> Self {
        Self {
            op: WorkOp::Delete { id: id.into() },
            batch: false,
        }
    }

    pub fn batch(mut self) -> Self {
        self.batch = true;
        self
    }
}

/// An item that could not be applied
#[derive(Debug)]
pub struct ItemFailure {
    /// Position in submission order
    pub index: usize,
    pub kind: WorkKind,
    pub error: StrataError,
}

/// What one `run` did
#[derive(Debug, Default)]
pub struct RunReport {
    pub applied: usize,
    pub failures: Vec<ItemFailure>,
    pub batch_mode: bool,
    pub optimized: bool,
    /// Set when the optimize pass failed after a successful commit
    pub optimize_error: Option<StrataError>,
    pub generation: u64,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.optimize_error.is_none()
    }
}

/// Applies queued work items to one partition under a single writer.
///
/// `run` opens the writer (failure aborts the run with nothing applied),
/// applies the items in submission order, commits, optimizes unless any
/// item asked for batch mode, and closes the writer. An item that fails
/// with a recoverable error is recorded in the report and the loop goes on.
/// A fatal item error or a failed commit rolls back to the last commit.
pub struct QueueProcessor {
    store: PagedStore,
    config: StrataConfig,
    items: Vec<WorkItem>,
    metrics: Option<Arc<StrataMetrics>>,
}

impl QueueProcessor {
    pub fn new(store: PagedStore, config: StrataConfig) -> Self {
        Self {
            store,
            config,
            items: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<StrataMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Queue an item; returns its index in submission order
    pub fn submit(&mut self, item: WorkItem) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    pub fn submit_all(&mut self, items: impl IntoIterator<Item = WorkItem>) {
        self.items.extend(items);
    }

    pub fn pending(&self) -> usize {
        self.items.len()
    }

    pub fn run(&mut self) -> Result<RunReport> {
        let start = Instant::now();
        // Items stay queued until the writer is open
        let mut writer =
            PartitionWriter::open(self.store.clone(), self.config.clone(), self.metrics.clone())?;
        let items = std::mem::take(&mut self.items);
        let batch_mode = items.iter().any(|i| i.batch);
        writer.set_batch_mode(batch_mode);
        info!(items = items.len(), batch_mode, "queue run started");

        let mut report = RunReport {
            batch_mode,
            ..Default::default()
        };

        for (index, item) in items.into_iter().enumerate() {
            let kind = item.op.kind();
            match item.op.apply(&mut writer) {
                Ok(()) => {
                    report.applied += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_item(kind.as_str());
                    }
                }
                Err(error) if error.is_fatal() => {
                    warn!(index, %kind, %error, "fatal error applying item, rolling back");
                    Self::roll_back(writer);
                    return Err(error);
                }
                Err(error) => {
                    warn!(index, %kind, %error, "work item failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_failure();
                    }
                    report.failures.push(ItemFailure { index, kind, error });
                }
            }
        }

        report.generation = match writer.commit() {
            Ok(generation) => generation,
            Err(error) => {
                warn!(%error, "commit failed, rolling back");
                Self::roll_back(writer);
                return Err(error);
            }
        };

        if !batch_mode {
            match writer.optimize() {
                Ok(merged) => report.optimized = merged,
                Err(error) => {
                    warn!(%error, "optimize failed after commit");
                    report.optimize_error = Some(error);
                }
            }
        }

        report.generation = writer.close()?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        if let Some(metrics) = &self.metrics {
            metrics.record_run(start.elapsed().as_secs_f64());
        }
        info!(
            applied = report.applied,
            failed = report.failures.len(),
            optimized = report.optimized,
            generation = report.generation,
            "queue run finished"
        );
        Ok(report)
    }

    /// Roll back after a failed run; the caller reports the failure that caused it
    fn roll_back(writer: PartitionWriter) {
        if let Err(error) = writer.rollback() {
            error!(%error, "rollback failed");
        }
    }
}

use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use tracing::{debug, info};

use super::processor::{QueueProcessor, RunReport, WorkItem};
use crate::config::StrataConfig;
use crate::error::{Result, StrataError};
use crate::metrics::StrataMetrics;
use crate::store::PagedStore;

/// One run request for the worker thread
pub struct QueueJob {
    pub partition: String,
    pub items: Vec<WorkItem>,
    pub reply: Sender<Result<RunReport>>,
}

/// Dedicated thread that runs queue processors one job at a time.
///
/// Jobs are handled in arrival order on a single thread, so a partition
/// never sees two concurrent runs. Each partition has its own store.
pub struct QueueWorker {
    tx: Option<Sender<QueueJob>>,
    join: Option<thread::JoinHandle<()>>,
    stores: Arc<DashMap<String, PagedStore>>,
}

pub fn spawn_worker(config: StrataConfig, metrics: Option<Arc<StrataMetrics>>) -> Result<QueueWorker> {
    config.validate()?;
    let (tx, rx) = channel::unbounded::<QueueJob>();
    let stores: Arc<DashMap<String, PagedStore>> = Arc::new(DashMap::new());

    let worker_stores = stores.clone();
    let join = thread::Builder::new()
        .name("strata-queue".to_string())
        .spawn(move || run_jobs(rx, worker_stores, config, metrics))?;

    Ok(QueueWorker {
        tx: Some(tx),
        join: Some(join),
        stores,
    })
}

fn run_jobs(
    rx: Receiver<QueueJob>,
    stores: Arc<DashMap<String, PagedStore>>,
    config: StrataConfig,
    metrics: Option<Arc<StrataMetrics>>,
) {
    while let Ok(job) = rx.recv() {
        debug!(partition = %job.partition, items = job.items.len(), "queue job received");
        let result = store_for(&stores, &job.partition, &config).and_then(|store| {
            let mut processor = QueueProcessor::new(store, config.clone());
            if let Some(metrics) = &metrics {
                processor = processor.with_metrics(metrics.clone());
            }
            processor.submit_all(job.items);
            processor.run()
        });
        // The submitter may have stopped waiting
        let _ = job.reply.send(result);
    }
    info!("queue worker stopped");
}

fn store_for(
    stores: &DashMap<String, PagedStore>,
    partition: &str,
    config: &StrataConfig,
) -> Result<PagedStore> {
    if let Some(store) = stores.get(partition) {
        return Ok(store.clone());
    }
    let store = PagedStore::new(config.store.buffer_size)?;
    Ok(stores
        .entry(partition.to_string())
        .or_insert(store)
        .clone())
}

impl QueueWorker {
    /// Queue a run for `partition`; the receiver yields its report
    pub fn submit(
        &self,
        partition: impl Into<String>,
        items: Vec<WorkItem>,
    ) -> Result<Receiver<Result<RunReport>>> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| StrataError::Closed("queue worker".to_string()))?;
        let (reply, result) = channel::bounded(1);
        tx.send(QueueJob {
            partition: partition.into(),
            items,
            reply,
        })
        .map_err(|_| StrataError::Closed("queue worker".to_string()))?;
        Ok(result)
    }

    /// Submit and wait for the report
    pub fn run(&self, partition: impl Into<String>, items: Vec<WorkItem>) -> Result<RunReport> {
        self.submit(partition, items)?
            .recv()
            .map_err(|_| StrataError::Internal("queue worker dropped the job".to_string()))?
    }

    /// Store of a partition that has had at least one job
    pub fn store(&self, partition: &str) -> Option<PagedStore> {
        self.stores.get(partition).map(|s| s.clone())
    }

    pub fn partitions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Stop taking jobs, finish queued ones and join the thread
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.tx.take();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| StrataError::Internal("queue worker panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

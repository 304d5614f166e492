use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for writers and queue runs
#[derive(Clone)]
pub struct StrataMetrics {
    // Counters
    pub items_applied: CounterVec,
    pub item_failures: Counter,
    pub flushes: Counter,
    pub commits: Counter,
    pub rollbacks: Counter,
    pub optimizes: Counter,
    pub cache_evictions: Counter,

    // Gauges
    pub store_ram_bytes: Gauge,
    pub segment_count: Gauge,

    // Histograms
    pub run_duration: Histogram,
    pub flush_docs: Histogram,

    registry: Arc<Registry>,
}

impl StrataMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let items_applied = CounterVec::new(
            Opts::new("strata_items_applied_total", "Work items applied by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(items_applied.clone()))?;

        let item_failures = Counter::with_opts(Opts::new(
            "strata_item_failures_total",
            "Work items that failed to apply",
        ))?;
        registry.register(Box::new(item_failures.clone()))?;

        let flushes = Counter::with_opts(Opts::new(
            "strata_flushes_total",
            "Writer buffers flushed to segments",
        ))?;
        registry.register(Box::new(flushes.clone()))?;

        let commits = Counter::with_opts(Opts::new(
            "strata_commits_total",
            "Manifest generations committed",
        ))?;
        registry.register(Box::new(commits.clone()))?;

        let rollbacks = Counter::with_opts(Opts::new(
            "strata_rollbacks_total",
            "Writer sessions rolled back",
        ))?;
        registry.register(Box::new(rollbacks.clone()))?;

        let optimizes = Counter::with_opts(Opts::new(
            "strata_optimizes_total",
            "Optimize passes that merged segments",
        ))?;
        registry.register(Box::new(optimizes.clone()))?;

        let cache_evictions = Counter::with_opts(Opts::new(
            "strata_cache_evictions_total",
            "Ordinal cache puts that evicted entries",
        ))?;
        registry.register(Box::new(cache_evictions.clone()))?;

        let store_ram_bytes = Gauge::with_opts(Opts::new(
            "strata_store_ram_bytes",
            "Bytes held by paged store buffers",
        ))?;
        registry.register(Box::new(store_ram_bytes.clone()))?;

        let segment_count = Gauge::with_opts(Opts::new(
            "strata_segment_count",
            "Segments in the last committed manifest",
        ))?;
        registry.register(Box::new(segment_count.clone()))?;

        let run_duration = Histogram::with_opts(
            HistogramOpts::new("strata_run_duration_seconds", "Queue run duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        let flush_docs = Histogram::with_opts(
            HistogramOpts::new("strata_flush_docs", "Documents written per flush")
                .buckets(vec![1.0, 10.0, 100.0, 1000.0, 10_000.0, 100_000.0]),
        )?;
        registry.register(Box::new(flush_docs.clone()))?;

        Ok(Self {
            items_applied,
            item_failures,
            flushes,
            commits,
            rollbacks,
            optimizes,
            cache_evictions,
            store_ram_bytes,
            segment_count,
            run_duration,
            flush_docs,
            registry: Arc::new(registry),
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn record_item(&self, kind: &str) {
        self.items_applied.with_label_values(&[kind]).inc();
    }

    pub fn record_failure(&self) {
        self.item_failures.inc();
    }

    pub fn record_flush(&self, docs: usize) {
        self.flushes.inc();
        self.flush_docs.observe(docs as f64);
    }

    pub fn record_commit(&self, segments: usize) {
        self.commits.inc();
        self.segment_count.set(segments as f64);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.inc();
    }

    pub fn record_optimize(&self) {
        self.optimizes.inc();
    }

    pub fn record_eviction(&self) {
        self.cache_evictions.inc();
    }

    pub fn set_store_ram(&self, bytes: u64) {
        self.store_ram_bytes.set(bytes as f64);
    }

    pub fn record_run(&self, duration_secs: f64) {
        self.run_duration.observe(duration_secs);
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

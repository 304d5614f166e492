//! Strata: segment-oriented in-memory storage and caching
//!
//! - [`store`]: paged in-memory files with advisory locks
//! - [`values`]: per-document field value caches
//! - [`ordinals`]: ordinal caches and the category taxonomy built on them
//! - [`flush`]: flush triggers for writer buffers
//! - [`partition`]: segment writer and reader over a store
//! - [`queue`]: single-writer work queue processing

pub mod config;
pub mod error;
pub mod flush;
pub mod metrics;
pub mod ordinals;
pub mod partition;
pub mod queue;
pub mod store;
pub mod types;
pub mod values;

pub use config::{CacheConfig, CacheKind, FlushConfig, FlushProfile, StrataConfig, DISABLE_AUTO_FLUSH};
pub use error::{Result, StrataError};
pub use flush::{BufferState, BufferStatus, FlushControl, FlushDecision, FlushPolicy};
pub use metrics::StrataMetrics;
pub use ordinals::{
    new_ordinal_cache, CategoryPath, LruOrdinalCache, OrdinalCache, TaxonomyReader,
    TaxonomyWriter, UnboundedOrdinalCache,
};
pub use partition::{Document, PartitionReader, PartitionWriter};
pub use queue::{spawn_worker, QueueProcessor, QueueWorker, RunReport, WorkItem, WorkOp};
pub use store::{PagedInput, PagedOutput, PagedStore, StoreLock};
pub use types::{DocId, Ordinal, SegmentId};
pub use values::{FieldKind, FieldValue, FieldValueCache, FieldValueCacheBuilder, ScratchPool};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

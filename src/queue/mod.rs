//! Work queue processing
//!
//! [`QueueProcessor`] drains submitted work items into one partition
//! writer. [`spawn_worker`] runs processors on a dedicated thread fed over
//! a channel.

mod processor;
mod worker;

pub use processor::{ItemFailure, QueueProcessor, RunReport, WorkItem, WorkKind, WorkOp};
pub use worker::{spawn_worker, QueueJob, QueueWorker};

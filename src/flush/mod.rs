//! Flush triggers for writer buffers
//!
//! [`FlushControl`] holds per-buffer counters and states; [`FlushPolicy`]
//! inspects them after every insert or delete and marks buffers pending.

mod control;
mod policy;

pub use control::{BufferState, BufferStatus, FlushControl};
pub use policy::{FlushDecision, FlushPolicy};

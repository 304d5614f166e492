//! Core identifier types shared across the crate

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense document number (0..max_doc) within a reader or segment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Dense positive identifier assigned to a key. Zero is reserved for
/// "no value" and is never handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ordinal(pub i32);

impl Ordinal {
    pub const ABSENT: Ordinal = Ordinal(0);

    pub fn new(n: i32) -> Self {
        Self(n)
    }

    pub fn get(self) -> i32 {
        self.0
    }

    pub fn is_absent(self) -> bool {
        self.0 == 0
    }

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    /// The following ordinal, or `None` once `i32::MAX` is reached
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Segment identifier (monotonically increasing per partition)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Store file holding this segment's documents
    pub fn file_name(&self) -> String {
        format!("seg_{}.dat", self.0)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment_{}", self.0)
    }
}

/// External document key
pub type DocumentKey = String;

/// Get current Unix timestamp in seconds
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

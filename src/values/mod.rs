//! Field value cache
//!
//! Maps document ids to the decoded values of one field. Two strategies sit
//! behind [`DocOrdinals`]: single-valued fields keep one slot per document,
//! multi-valued fields keep an offsets array into a flat slot list.
//! Numeric and date projections decode the stored bytes on access.

mod cache;
mod field;
mod ordinals;
mod scratch;

pub use cache::{FieldValueCache, FieldValueCacheBuilder};
pub use field::{decode_as_date, decode_as_double, decode_value, FieldKind, FieldValue};
pub use ordinals::{DocOrdinals, MultiValueOrdinals, SingleValueOrdinals};
pub use scratch::ScratchPool;

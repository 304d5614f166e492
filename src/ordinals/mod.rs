//! Ordinal assignment for writers
//!
//! [`OrdinalCache`] maps encoded keys to ordinals in front of a durable log.
//! The taxonomy writer is its main user: it hands out one ordinal per
//! category path and keeps resolving evicted paths through the log.

mod cache;
mod taxonomy;

pub use cache::{new_ordinal_cache, LruOrdinalCache, OrdinalCache, UnboundedOrdinalCache};
pub use taxonomy::{
    CategoryPath, TaxonomyReader, TaxonomyWriter, DEFAULT_DELIMITER, ROOT_ORDINAL, TAXONOMY_COMMIT,
    TAXONOMY_LOCK, TAXONOMY_LOG,
};

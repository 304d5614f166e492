//! Ordinal caches and the taxonomy writer under eviction

use std::sync::Arc;

use strata::config::CacheConfig;
use strata::{
    new_ordinal_cache, CacheKind, CategoryPath, LruOrdinalCache, Ordinal, OrdinalCache, PagedStore,
    TaxonomyReader, TaxonomyWriter, UnboundedOrdinalCache,
};

fn path(s: &str) -> CategoryPath {
    CategoryPath::parse(s, '/').unwrap()
}

#[test]
fn test_has_room_means_no_eviction() {
    for capacity in [1usize, 2, 5, 16] {
        let cache = LruOrdinalCache::new(capacity).unwrap();
        let mut next = 1;
        for _ in 0..3 {
            let room = (0..=capacity).rev().find(|n| cache.has_room(*n)).unwrap();
            for _ in 0..room {
                let key = format!("k{}", next);
                assert!(!cache.put(key.as_bytes(), Ordinal(next)).unwrap());
                next += 1;
            }
            // Full now: the next put evicts
            assert!(!cache.has_room(1));
            let key = format!("k{}", next);
            assert!(cache.put(key.as_bytes(), Ordinal(next)).unwrap());
            next += 1;
        }
    }
}

#[test]
fn test_put_get_until_eviction() {
    let cache = LruOrdinalCache::new(2).unwrap();
    assert!(!cache.put(b"A", Ordinal(1)).unwrap());
    assert!(!cache.put(b"B", Ordinal(2)).unwrap());
    assert!(cache.put(b"C", Ordinal(3)).unwrap());

    let found: Vec<Option<Ordinal>> = [b"A", b"B", b"C"]
        .iter()
        .map(|k| cache.get(*k).unwrap())
        .collect();
    for (value, expected) in found.iter().zip([1, 2, 3]) {
        if let Some(ordinal) = value {
            assert_eq!(*ordinal, Ordinal(expected));
        }
    }
    assert!(found.iter().any(Option::is_none));
}

#[test]
fn test_eviction_order_is_deterministic() {
    let run = || {
        let cache = LruOrdinalCache::new(3).unwrap();
        let mut evictions = Vec::new();
        for i in 1..=20 {
            let key = format!("k{}", i % 7);
            let _ = cache.get(format!("k{}", i % 4).as_bytes()).unwrap();
            evictions.push(cache.put(key.as_bytes(), Ordinal(i)).unwrap());
        }
        let present: Vec<bool> = (0..7)
            .map(|k| cache.get(format!("k{}", k).as_bytes()).unwrap().is_some())
            .collect();
        (evictions, present)
    };
    assert_eq!(run(), run());
}

#[test]
fn test_concurrent_cache_access() {
    let cache: Arc<dyn OrdinalCache> = Arc::new(UnboundedOrdinalCache::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    let ordinal = Ordinal(t * 250 + i + 1);
                    let key = format!("t{}-{}", t, i);
                    cache.put(key.as_bytes(), ordinal).unwrap();
                    assert_eq!(cache.get(key.as_bytes()).unwrap(), Some(ordinal));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.len(), 1000);
}

#[test]
fn test_taxonomy_survives_tiny_cache() {
    let store = PagedStore::new(16).unwrap();
    let config = CacheConfig {
        kind: CacheKind::Lru,
        ordinal_capacity: 3,
    };
    let mut writer = TaxonomyWriter::open(store.clone(), new_ordinal_cache(&config).unwrap(), 0)
        .unwrap();

    let paths = [
        "color/red",
        "color/blue",
        "size/xl",
        "color/red/dark",
        "brand/acme",
        "size/s",
    ];
    let first: Vec<Ordinal> = paths
        .iter()
        .map(|p| writer.add_category(&path(p)).unwrap())
        .collect();
    // Ordinals are assigned once even after their entries were evicted
    let second: Vec<Ordinal> = paths
        .iter()
        .map(|p| writer.add_category(&path(p)).unwrap())
        .collect();
    assert_eq!(first, second);
    assert!(!writer.is_cache_complete());
    let size = writer.size();
    writer.close().unwrap();

    let reader = TaxonomyReader::open(&store).unwrap();
    assert_eq!(reader.size(), size);
    for (p, ordinal) in paths.iter().zip(&first) {
        assert_eq!(reader.ordinal(&path(p)), Some(*ordinal));
        assert_eq!(reader.path(*ordinal), Some(&path(p)));
    }
    let color = reader.ordinal(&path("color")).unwrap();
    assert_eq!(reader.parent(first[0]), Some(color));

    // Reopening with an unbounded cache sees the same assignments
    let cache = Arc::new(UnboundedOrdinalCache::new());
    let mut writer = TaxonomyWriter::open(store, cache, 0).unwrap();
    assert!(writer.is_cache_complete());
    assert_eq!(writer.ordinal(&path("size/s")).unwrap(), Some(first[5]));
}

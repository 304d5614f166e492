//! End-to-end: work items through the queue into segments and back out as
//! field value caches

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use strata::partition::WRITE_LOCK;
use strata::queue::WorkKind;
use strata::{
    Document, FieldValue, PagedStore, PartitionReader, QueueProcessor, ScratchPool, StrataConfig,
    StrataError, StrataMetrics, WorkItem,
};

fn product(id: &str, price: i64, tags: &[&str]) -> Document {
    let mut doc = Document::new(id).with_field("price", FieldValue::Long(price));
    for tag in tags {
        doc.add_field("tag", FieldValue::Keyword(tag.to_string()));
    }
    doc
}

fn small_buffers_config() -> StrataConfig {
    let mut map = HashMap::new();
    map.insert("maxBufferedDocs".to_string(), "2".to_string());
    map.insert("ramBufferSizeMB".to_string(), "-1".to_string());
    map.insert("store.buffer_size".to_string(), "16".to_string());
    map.insert("writer.buffer_shards".to_string(), "1".to_string());
    map.insert("writer.lock_timeout_ms".to_string(), "0".to_string());
    StrataConfig::from_map(&map).unwrap()
}

#[test]
fn test_queue_run_builds_field_caches() {
    let config = small_buffers_config();
    let store = PagedStore::new(config.store.buffer_size).unwrap();
    let metrics = Arc::new(StrataMetrics::new().unwrap());
    let mut queue = QueueProcessor::new(store.clone(), config).with_metrics(metrics.clone());

    queue.submit(WorkItem::add(product("p1", 30, &["red", "sale"])));
    queue.submit(WorkItem::add(product("p2", 10, &[])));
    queue.submit(WorkItem::add(product("p3", 20, &["blue"])));
    queue.submit(WorkItem::add(product("p4", 99, &["red"])));
    queue.submit(WorkItem::update("p2", product("p2", 15, &["blue"])));
    queue.submit(WorkItem::delete("p4"));

    let report = queue.run().unwrap();
    assert_eq!(report.applied, 6);
    assert!(report.is_clean());
    assert!(report.optimized);
    assert!(metrics.flushes.get() >= 2.0);
    assert_eq!(metrics.items_applied.with_label_values(&["add"]).get(), 4.0);

    let reader = PartitionReader::open(&store).unwrap();
    assert_eq!(reader.segment_count(), 1);
    assert_eq!(reader.doc_count(), 3);

    let prices = reader.field_values("price").unwrap();
    let tags = reader.field_values("tag").unwrap();
    assert!(!prices.is_multi_valued());
    assert!(tags.is_multi_valued());

    let mut doubles = ScratchPool::new();
    let mut keywords = ScratchPool::new();
    let p1 = reader.doc_id("p1").unwrap();
    let p2 = reader.doc_id("p2").unwrap();
    assert_eq!(prices.doubles_for(p1, &mut doubles).unwrap(), &[30.0]);
    assert_eq!(prices.doubles_for(p2, &mut doubles).unwrap(), &[15.0]);
    assert_eq!(tags.values_for(p1, &mut keywords).len(), 2);
    assert_eq!(tags.values_for(p2, &mut keywords), &[bytes::Bytes::from("blue")]);
    assert!(reader.doc_id("p4").is_none());
}

#[test]
fn test_failures_reported_with_positions() {
    let config = small_buffers_config();
    let store = PagedStore::new(config.store.buffer_size).unwrap();
    let mut queue = QueueProcessor::new(store.clone(), config);

    queue.submit(WorkItem::add(product("p1", 1, &[])));
    queue.submit(WorkItem::add(
        Document::new("p2").with_field("price", FieldValue::Double(1.5)),
    ));
    queue.submit(WorkItem::update("other", product("p3", 3, &[])));
    queue.submit(WorkItem::add(product("p4", 4, &[])));

    let report = queue.run().unwrap();
    assert_eq!(report.applied, 2);
    let failed: Vec<(usize, WorkKind)> =
        report.failures.iter().map(|f| (f.index, f.kind)).collect();
    assert_eq!(failed, vec![(1, WorkKind::Add), (2, WorkKind::Update)]);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, StrataError::InvalidRequest(_))));

    assert_eq!(PartitionReader::open(&store).unwrap().doc_count(), 2);
}

#[test]
fn test_blocked_run_changes_nothing() {
    let config = small_buffers_config();
    let store = PagedStore::new(config.store.buffer_size).unwrap();
    let mut first = QueueProcessor::new(store.clone(), config.clone());
    first.submit(WorkItem::add(product("p1", 1, &[])));
    first.run().unwrap();
    let files = store.list_files();

    let mut held = store.make_lock(WRITE_LOCK);
    assert!(held.obtain(0).unwrap());
    let mut blocked = QueueProcessor::new(store.clone(), config);
    blocked.submit(WorkItem::delete("p1"));
    assert!(matches!(blocked.run(), Err(StrataError::LockHeld(_))));
    assert_eq!(store.list_files(), files);
    assert_eq!(PartitionReader::open(&store).unwrap().doc_count(), 1);
}

#[test]
fn test_batch_run_keeps_segments() {
    let config = small_buffers_config();
    let store = PagedStore::new(config.store.buffer_size).unwrap();
    let mut queue = QueueProcessor::new(store.clone(), config);
    for i in 0..6 {
        let when = Utc.timestamp_millis_opt(1_700_000_000_000 + i).unwrap();
        let doc = Document::new(format!("e{}", i)).with_field("at", FieldValue::Date(when));
        queue.submit(WorkItem::add(doc).batch());
    }
    let report = queue.run().unwrap();
    assert!(report.batch_mode);
    assert!(!report.optimized);

    let reader = PartitionReader::open(&store).unwrap();
    assert_eq!(reader.segment_count(), 3);
    let at = reader.field_values("at").unwrap();
    let mut dates = ScratchPool::new();
    let e5 = reader.doc_id("e5").unwrap();
    assert_eq!(
        at.dates_for(e5, &mut dates).unwrap()[0].timestamp_millis(),
        1_700_000_000_005
    );
}

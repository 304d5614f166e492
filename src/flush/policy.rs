use tracing::debug;

use super::control::{BufferStatus, FlushControl};
use crate::config::FlushConfig;

/// Outcome of one policy check
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushDecision {
    /// Buffer moved to `FlushPending` by this check
    pub flush: Option<usize>,
    /// The delete queue should be applied now
    pub apply_deletes: bool,
}

impl FlushDecision {
    pub fn is_noop(&self) -> bool {
        self.flush.is_none() && !self.apply_deletes
    }
}

/// Flush triggers over a [`FlushControl`].
///
/// Checks never fail. A disabled threshold is skipped.
#[derive(Clone, Debug)]
pub struct FlushPolicy {
    config: FlushConfig,
}

impl FlushPolicy {
    pub fn new(config: FlushConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FlushConfig {
        &self.config
    }

    /// After a document went into buffer `id`.
    ///
    /// The doc-count trigger marks that buffer. The RAM trigger marks the
    /// accepting buffer with the most active bytes.
    pub fn on_insert(&self, control: &mut FlushControl, id: usize) -> FlushDecision {
        let mut decision = FlushDecision::default();

        if self.config.flush_on_doc_count() {
            let hit = control.buffer(id).is_some_and(|b| {
                b.status == BufferStatus::Accepting
                    && b.doc_count as i64 >= self.config.max_buffered_docs as i64
            });
            if hit {
                control.force_pending(id);
                debug!(buffer = id, "doc count reached, flush pending");
                decision.flush = Some(id);
                return decision;
            }
        }

        if let Some(limit) = self.config.ram_limit_bytes() {
            let active = control.active_bytes();
            if active >= limit {
                if let Some(largest) = control.largest_accepting() {
                    control.force_pending(largest);
                    debug!(
                        buffer = largest,
                        active_bytes = active,
                        limit,
                        "ram limit reached, flush pending"
                    );
                    decision.flush = Some(largest);
                }
            }
        }
        decision
    }

    /// After a delete term was queued.
    ///
    /// Delete bytes above half the RAM limit force the queue to be applied
    /// whatever the term count is.
    pub fn on_delete(&self, control: &mut FlushControl) -> FlushDecision {
        let mut apply = false;

        if self.config.flush_on_delete_terms()
            && control.delete_terms() as i64 >= self.config.max_buffered_delete_terms as i64
        {
            debug!(terms = control.delete_terms(), "delete term limit reached");
            apply = true;
        }

        if let Some(limit) = self.config.ram_limit_bytes() {
            if control.delete_bytes() > limit / 2 {
                debug!(
                    delete_bytes = control.delete_bytes(),
                    limit, "delete queue over half the ram limit"
                );
                apply = true;
            }
        }

        if apply {
            control.set_apply_all_deletes();
        }
        FlushDecision {
            flush: None,
            apply_deletes: apply,
        }
    }

    /// An update is a delete followed by an insert
    pub fn on_update(&self, control: &mut FlushControl, id: usize) -> FlushDecision {
        let deletes = self.on_delete(control);
        let inserts = self.on_insert(control, id);
        FlushDecision {
            flush: inserts.flush,
            apply_deletes: deletes.apply_deletes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DISABLE_AUTO_FLUSH;

    fn policy(docs: i32, ram_mb: f64, terms: i32) -> FlushPolicy {
        FlushPolicy::new(FlushConfig {
            max_buffered_docs: docs,
            ram_buffer_size_mb: ram_mb,
            max_buffered_delete_terms: terms,
        })
    }

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_two_docs_marks_buffer_pending() {
        let policy = policy(2, DISABLE_AUTO_FLUSH as f64, DISABLE_AUTO_FLUSH);
        let mut control = FlushControl::new(1);

        control.record_insert(0, 10).unwrap();
        assert!(policy.on_insert(&mut control, 0).is_noop());
        assert_eq!(control.status(0), Some(BufferStatus::Accepting));

        control.record_insert(0, 10).unwrap();
        let decision = policy.on_insert(&mut control, 0);
        assert_eq!(decision.flush, Some(0));
        assert_eq!(control.status(0), Some(BufferStatus::FlushPending));
    }

    #[test]
    fn test_ram_trigger_picks_largest_buffer() {
        let policy = policy(DISABLE_AUTO_FLUSH, 1.0, DISABLE_AUTO_FLUSH);
        let mut control = FlushControl::new(3);

        control.record_insert(0, MB / 4).unwrap();
        control.record_insert(1, MB / 2).unwrap();
        assert!(policy.on_insert(&mut control, 1).is_noop());

        control.record_insert(2, MB / 4).unwrap();
        let decision = policy.on_insert(&mut control, 2);
        assert_eq!(decision.flush, Some(1));
        assert_eq!(control.status(1), Some(BufferStatus::FlushPending));
        assert_eq!(control.status(2), Some(BufferStatus::Accepting));
    }

    #[test]
    fn test_pending_if_and_only_if_threshold_reached() {
        let configs = [
            (1, DISABLE_AUTO_FLUSH as f64),
            (3, DISABLE_AUTO_FLUSH as f64),
            (DISABLE_AUTO_FLUSH, 0.001),
            (5, 0.002),
            (DISABLE_AUTO_FLUSH, 16.0),
        ];
        for (docs, ram_mb) in configs {
            let policy = policy(docs, ram_mb, DISABLE_AUTO_FLUSH);
            let mut control = FlushControl::new(1);
            for _ in 0..8 {
                control.record_insert(0, 300).unwrap();
                let state = control.buffer(0).unwrap().clone();
                let expected = (docs != DISABLE_AUTO_FLUSH && state.doc_count as i32 >= docs)
                    || policy
                        .config()
                        .ram_limit_bytes()
                        .is_some_and(|limit| state.active_bytes >= limit);

                let decision = policy.on_insert(&mut control, 0);
                assert_eq!(decision.flush.is_some(), expected, "docs={docs} ram={ram_mb}");
                if expected {
                    control.begin_flush(0).unwrap();
                    control.finish_flush(0).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_delete_term_limit() {
        let policy = policy(10, DISABLE_AUTO_FLUSH as f64, 2);
        let mut control = FlushControl::new(1);
        control.record_delete(0, 8).unwrap();
        assert!(!policy.on_delete(&mut control).apply_deletes);
        control.record_delete(0, 8).unwrap();
        assert!(policy.on_delete(&mut control).apply_deletes);
        assert!(control.apply_all_deletes());
    }

    #[test]
    fn test_delete_bytes_over_half_ram_force_apply() {
        // Term limit disabled, RAM limit 1 MB
        let policy = policy(DISABLE_AUTO_FLUSH, 1.0, DISABLE_AUTO_FLUSH);
        let mut control = FlushControl::new(1);
        control.record_delete(0, MB / 2).unwrap();
        assert!(!policy.on_delete(&mut control).apply_deletes);
        control.record_delete(0, 1).unwrap();
        assert!(policy.on_delete(&mut control).apply_deletes);
    }

    #[test]
    fn test_on_update_combines_both_checks() {
        let policy = policy(1, DISABLE_AUTO_FLUSH as f64, 1);
        let mut control = FlushControl::new(2);
        control.record_delete(1, 8).unwrap();
        control.record_insert(1, 8).unwrap();
        let decision = policy.on_update(&mut control, 1);
        assert_eq!(decision.flush, Some(1));
        assert!(decision.apply_deletes);
    }
}

//! Dedup and bounded history of delivered alerts.
//!
//! One store instance lives for the whole process. The scheduler task is
//! the only writer; HTTP handlers read snapshots. Dedup is deliberately a
//! single remembered identifier, not a seen-set: the upstream feed
//! presents at most one genuinely new alert per poll and its ordering is
//! monotonic, so only the immediate predecessor needs remembering.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::model::AlertRecord;

/// Hard cap on retained history.
pub const HISTORY_CAP: usize = 1000;
/// Once the cap is exceeded, history is trimmed down to this many newest
/// records.
pub const HISTORY_KEEP: usize = 500;

#[derive(Debug, Default)]
pub struct HistoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    last_identifier: Option<String>,
    history: VecDeque<AlertRecord>,
}

impl HistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a record iff its identifier differs from the most recently
    /// delivered one. On admission the identifier is remembered, the
    /// record is appended, and the capacity bound is enforced, all under
    /// one lock acquisition. Rejection changes nothing.
    pub fn admit(&self, record: &AlertRecord) -> bool {
        let mut inner = self.lock();
        if inner.last_identifier.as_deref() == Some(record.identifier.as_str()) {
            return false;
        }
        inner.last_identifier = Some(record.identifier.clone());
        inner.history.push_back(record.clone());
        if inner.history.len() > HISTORY_CAP {
            let excess = inner.history.len() - HISTORY_KEEP;
            inner.history.drain(..excess);
        }
        true
    }

    /// Atomic multi-record read for the query endpoint, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AlertRecord> {
        self.lock().history.iter().cloned().collect()
    }

    #[must_use]
    pub fn last_identifier(&self) -> Option<String> {
        self.lock().last_identifier.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a reader panicked mid-clone; the
        // data itself is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::{HISTORY_CAP, HISTORY_KEEP, HistoryStore};
    use crate::model::AlertRecord;

    fn record(identifier: &str) -> AlertRecord {
        let updated = match DateTime::parse_from_rfc3339("2024-05-01T12:00:00-06:00") {
            Ok(dt) => dt,
            Err(err) => panic!("fixture timestamp should parse: {err}"),
        };
        AlertRecord {
            identifier: identifier.to_string(),
            title: "Sismo".to_string(),
            updated,
            sent: None,
            sender: None,
            status: None,
            msg_type: None,
            source: None,
            scope: None,
            code: None,
            note: None,
            references: None,
            details: Vec::new(),
        }
    }

    #[test]
    fn distinct_identifiers_admit_once_each() {
        let store = HistoryStore::new();
        for id in ["A", "B", "C"] {
            assert!(store.admit(&record(id)));
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.last_identifier().as_deref(), Some("C"));
    }

    #[test]
    fn immediate_duplicate_is_rejected_without_side_effects() {
        let store = HistoryStore::new();
        assert!(store.admit(&record("X1")));
        assert!(!store.admit(&record("X1")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.last_identifier().as_deref(), Some("X1"));
    }

    #[test]
    fn replayed_identifier_is_readmitted_after_a_newer_one() {
        // Known limitation of the single-slot dedup: only the immediate
        // predecessor is remembered, so an A-B-A replay admits A twice.
        let store = HistoryStore::new();
        assert!(store.admit(&record("A")));
        assert!(store.admit(&record("B")));
        assert!(store.admit(&record("A")));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn history_trims_to_keep_bound_once_cap_is_exceeded() {
        let store = HistoryStore::new();
        for i in 0..=HISTORY_CAP {
            assert!(store.admit(&record(&format!("id-{i}"))));
            assert!(store.len() <= HISTORY_CAP);
        }
        assert_eq!(store.len(), HISTORY_KEEP);
        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].identifier, format!("id-{}", HISTORY_CAP + 1 - HISTORY_KEEP));
        assert_eq!(
            snapshot[HISTORY_KEEP - 1].identifier,
            format!("id-{HISTORY_CAP}")
        );
    }

    #[test]
    fn snapshot_preserves_admission_order() {
        let store = HistoryStore::new();
        for id in ["1", "2", "3"] {
            store.admit(&record(id));
        }
        let ids: Vec<_> = store.snapshot().into_iter().map(|r| r.identifier).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }
}

//! Snapshot store
//!
//! The committed snapshot lives behind an `Arc`; publishing swaps the `Arc`
//! under a write lock held only for the swap, so readers always see one
//! complete cycle and never wait on a refresh in progress.

use crate::models::{FleetStats, Snapshot, SnapshotView, TrailerRecord};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last committed snapshot, `None` before the first cycle completes
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    /// Replace the snapshot wholesale. `captured_at` never moves backwards.
    pub fn publish(&self, records: Vec<TrailerRecord>) -> Arc<Snapshot> {
        let mut current = self.current.write();
        let now = Utc::now();
        let captured_at = match current.as_ref() {
            Some(previous) if previous.captured_at > now => previous.captured_at,
            _ => now,
        };

        let snapshot = Arc::new(Snapshot {
            records,
            captured_at,
        });
        *current = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Case-insensitive substring search over originalId, driver, account
    /// and provider. An empty or blank query returns every record in order.
    pub fn search(&self, query: Option<&str>) -> Vec<TrailerRecord> {
        self.current()
            .map(|snapshot| filter(&snapshot, query))
            .unwrap_or_default()
    }

    /// Records and `captured_at` always come from the same snapshot
    pub fn view(&self, query: Option<&str>) -> SnapshotView {
        match self.current() {
            Some(snapshot) => view_of(&snapshot, query),
            None => SnapshotView {
                records: Vec::new(),
                count: 0,
                captured_at: None,
            },
        }
    }

    /// Computed fresh from the current snapshot on every call
    pub fn stats(&self) -> FleetStats {
        self.current()
            .map(|s| FleetStats::from_records(&s.records))
            .unwrap_or_default()
    }
}

fn filter(snapshot: &Snapshot, query: Option<&str>) -> Vec<TrailerRecord> {
    match query.map(str::trim).filter(|q| !q.is_empty()) {
        None => snapshot.records.clone(),
        Some(q) => {
            let needle = q.to_lowercase();
            snapshot
                .records
                .iter()
                .filter(|r| r.matches(&needle))
                .cloned()
                .collect()
        }
    }
}

fn view_of(snapshot: &Snapshot, query: Option<&str>) -> SnapshotView {
    let records = filter(snapshot, query);
    SnapshotView {
        count: records.len(),
        records,
        captured_at: Some(snapshot.captured_at),
    }
}

//! Time-bounded report cache
//!
//! Reports are kept so they can be exported after the validation call that
//! produced them. Entries expire after the configured TTL; expiry is checked on
//! read and by [`ReportCache::evict_expired`], never by a background task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::reporter::ValidationReport;

#[derive(Debug)]
struct CachedReport {
    report: Arc<ValidationReport>,
    stored_at: Instant,
}

/// Shared report cache; clones share entries
#[derive(Debug, Clone)]
pub struct ReportCache {
    entries: Arc<DashMap<Uuid, CachedReport>>,
    ttl: Duration,
}

impl ReportCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a report under its validation id
    pub fn insert(&self, report: ValidationReport) -> Arc<ValidationReport> {
        let report = Arc::new(report);
        self.entries.insert(
            report.validation_id,
            CachedReport {
                report: Arc::clone(&report),
                stored_at: Instant::now(),
            },
        );
        report
    }

    /// Live report by id; an expired entry is dropped and reported absent
    #[must_use]
    pub fn get(&self, validation_id: &Uuid) -> Option<Arc<ValidationReport>> {
        let live = self.entries.get(validation_id).and_then(|entry| {
            (entry.stored_at.elapsed() < self.ttl).then(|| Arc::clone(&entry.report))
        });
        if live.is_none() {
            self.entries
                .remove_if(validation_id, |_, entry| entry.stored_at.elapsed() >= self.ttl);
        }
        live
    }

    /// Drop every expired entry, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Evicted expired validation reports");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Metrics accumulation
//!
//! Owns the [`Metrics`] counters and the sliding window of recent insertions
//! that the scorer reads for its keystroke and rhythm terms.

use crate::classifier::ClassifiedEdit;
use crate::types::{ActivityEntry, EventType, Metrics};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Running counters plus the activity window
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    metrics: Metrics,
    activity: VecDeque<ActivityEntry>,
    window: Duration,
}

impl MetricsAccumulator {
    /// `window_ms`: max age of activity entries
    pub fn new(now: DateTime<Utc>, window_ms: i64) -> Self {
        Self {
            metrics: Metrics::new(now),
            activity: VecDeque::new(),
            window: Duration::milliseconds(window_ms),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Activity entries, oldest first
    pub fn activity(&self) -> &VecDeque<ActivityEntry> {
        &self.activity
    }

    /// Timestamp of the newest activity entry
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.activity.back().map(|e| e.timestamp)
    }

    pub fn record_insertion(&mut self, n: usize) {
        self.metrics.total_insertions += n as u64;
    }

    pub fn record_deletion(&mut self, n: usize) {
        self.metrics.total_deletions += n as u64;
    }

    /// Every pure deletion counts as undo, by removed characters
    pub fn record_undo(&mut self, n: usize) {
        self.metrics.undo_count += n as u64;
    }

    pub fn record_ai_insertion(&mut self) {
        self.metrics.ai_insertions += 1;
    }

    /// Manual user action, independent of the classifier
    pub fn record_ai_rejection(&mut self) {
        self.metrics.ai_rejections += 1;
    }

    /// Mark a real edit at `timestamp`
    pub fn touch_activity(&mut self, timestamp: DateTime<Utc>) {
        self.metrics.last_change_timestamp = timestamp;
    }

    /// Force the idle mark back to `since`
    pub fn note_idle(&mut self, since: DateTime<Utc>) {
        self.metrics.last_change_timestamp = since;
    }

    /// Append an insertion to the activity window
    pub fn record_activity(&mut self, timestamp: DateTime<Utc>, size: usize) {
        self.activity.push_back(ActivityEntry { timestamp, size });
        self.prune(timestamp);
    }

    /// Drop entries older than the window, relative to `now`
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.activity.retain(|e| e.timestamp >= cutoff);
    }

    pub fn set_consecutive_low(&mut self, count: u32) {
        self.metrics.consecutive_low_flow_count = count;
    }

    /// Fold one classified edit into the counters
    pub fn apply(&mut self, edit: &ClassifiedEdit, timestamp: DateTime<Utc>) {
        if edit.inserted > 0 {
            self.record_insertion(edit.inserted);
            self.record_activity(timestamp, edit.inserted);
        }
        if edit.removed > 0 {
            self.record_deletion(edit.removed);
            if edit.kind == EventType::Delete {
                self.record_undo(edit.removed);
            }
        }
        if edit.is_ai() {
            self.record_ai_insertion();
        }
        self.touch_activity(timestamp);
    }
}

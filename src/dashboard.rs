//! Dashboard snapshot delivery
//!
//! The dashboard gets one snapshot when it opens. The message channel offers
//! no delivery guarantee, so unless the dashboard acknowledges, the same
//! snapshot is pushed once more after a fixed delay.

use crate::types::{ClassifiedEvent, FlowSample, Metrics, MoodEntry};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Message sent to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Most recent samples, oldest first
    pub history: Vec<FlowSample>,
    pub moods: Vec<MoodEntry>,
    pub events: Vec<ClassifiedEvent>,
    pub metrics: Metrics,
}

/// Tracks the single fallback push per dashboard open
#[derive(Debug, Clone)]
pub struct DashboardHandshake {
    delay: Duration,
    fallback_due: Option<DateTime<Utc>>,
}

impl DashboardHandshake {
    pub fn new(delay_ms: i64) -> Self {
        Self {
            delay: Duration::milliseconds(delay_ms),
            fallback_due: None,
        }
    }

    /// The dashboard was opened and sent its first snapshot at `now`
    pub fn opened(&mut self, now: DateTime<Utc>) {
        self.fallback_due = Some(now + self.delay);
    }

    /// The dashboard confirmed receipt; no fallback needed
    pub fn acknowledge(&mut self) {
        self.fallback_due = None;
    }

    pub fn is_pending(&self) -> bool {
        self.fallback_due.is_some()
    }

    /// Returns true exactly once, when the fallback push is due
    pub fn poll_fallback(&mut self, now: DateTime<Utc>) -> bool {
        match self.fallback_due {
            Some(due) if now >= due => {
                self.fallback_due = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fallback_fires_once_after_delay() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let mut handshake = DashboardHandshake::new(1500);
        handshake.opened(start);

        assert!(!handshake.poll_fallback(start + Duration::milliseconds(1000)));
        assert!(handshake.poll_fallback(start + Duration::milliseconds(1500)));
        assert!(!handshake.poll_fallback(start + Duration::seconds(10)));
    }

    #[test]
    fn test_acknowledge_cancels_fallback() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let mut handshake = DashboardHandshake::new(1500);
        handshake.opened(start);
        handshake.acknowledge();

        assert!(!handshake.is_pending());
        assert!(!handshake.poll_fallback(start + Duration::seconds(5)));
    }
}

//! Bounded append-only logs
//!
//! Flow samples, classified events and mood reports are each kept in a
//! [`BoundedLog`] that evicts its oldest entry once the cap is reached.
//! [`FlowLogs`] groups the three and mirrors them into the key-value store.

use crate::config::FlowConfig;
use crate::error::VibeflowError;
use crate::store::{self, KeyValueStore, EVENTS_KEY, HISTORY_KEY, MOODS_KEY};
use crate::types::{ClassifiedEvent, FlowSample, MoodEntry};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// FIFO log with a hard length cap
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    cap: usize,
}

impl<T: Clone> BoundedLog<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Build from existing entries, keeping only the newest `cap`
    pub fn from_entries(entries: Vec<T>, cap: usize) -> Self {
        let mut log = Self::new(cap);
        log.extend(entries);
        log
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = T>) {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.entries.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    /// The newest `n` entries, oldest first
    pub fn latest(&self, n: usize) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

/// Export document `{history, moods, events}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogBundle {
    pub history: Vec<FlowSample>,
    pub moods: Vec<MoodEntry>,
    pub events: Vec<ClassifiedEvent>,
}

/// The three session logs
#[derive(Debug, Clone)]
pub struct FlowLogs {
    pub history: BoundedLog<FlowSample>,
    pub events: BoundedLog<ClassifiedEvent>,
    pub moods: BoundedLog<MoodEntry>,
}

impl FlowLogs {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            history: BoundedLog::new(config.history_cap),
            events: BoundedLog::new(config.event_cap),
            moods: BoundedLog::new(config.mood_cap),
        }
    }

    /// Restore logs from the store. Unreadable entries are logged and
    /// skipped; the affected log starts empty.
    pub fn restore(config: &FlowConfig, store: &dyn KeyValueStore) -> Self {
        Self {
            history: BoundedLog::from_entries(restore_entries(store, HISTORY_KEY), config.history_cap),
            events: BoundedLog::from_entries(restore_entries(store, EVENTS_KEY), config.event_cap),
            moods: BoundedLog::from_entries(restore_entries(store, MOODS_KEY), config.mood_cap),
        }
    }

    pub fn bundle(&self) -> LogBundle {
        LogBundle {
            history: self.history.to_vec(),
            moods: self.moods.to_vec(),
            events: self.events.to_vec(),
        }
    }

    pub fn persist_history(&self, store: &mut dyn KeyValueStore) {
        persist(store, HISTORY_KEY, &self.history);
    }

    pub fn persist_events(&self, store: &mut dyn KeyValueStore) {
        persist(store, EVENTS_KEY, &self.events);
    }

    pub fn persist_moods(&self, store: &mut dyn KeyValueStore) {
        persist(store, MOODS_KEY, &self.moods);
    }
}

fn restore_entries<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Vec<T> {
    match store::load::<Vec<T>>(store, key) {
        Ok(entries) => entries.unwrap_or_default(),
        Err(e) => {
            warn!("Discarding stored {}: {}", key, e);
            Vec::new()
        }
    }
}

/// Fire-and-forget write; a failure loses at most the latest entries
fn persist<T: Serialize + Clone>(store: &mut dyn KeyValueStore, key: &str, log: &BoundedLog<T>) {
    let result: Result<(), VibeflowError> = store::save(store, key, &log.entries);
    if let Err(e) = result {
        warn!("Failed to persist {}: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{EventType, Mood};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn sample(i: i64) -> FlowSample {
        FlowSample {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap() + Duration::seconds(i),
            score: (i % 101) as u8,
        }
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let mut log = BoundedLog::new(20_000);
        for i in 0..20_001 {
            log.push(sample(i));
        }

        assert_eq!(log.len(), 20_000);
        assert_eq!(log.first(), Some(&sample(1)));
        assert_eq!(log.last(), Some(&sample(20_000)));
    }

    #[test]
    fn test_latest_returns_tail_in_order() {
        let log = BoundedLog::from_entries((0..10).map(sample).collect(), 100);
        let tail = log.latest(3);
        assert_eq!(tail, vec![sample(7), sample(8), sample(9)]);
        assert_eq!(log.latest(50).len(), 10);
    }

    #[test]
    fn test_from_entries_keeps_newest() {
        let log = BoundedLog::from_entries((0..10).map(sample).collect(), 4);
        assert_eq!(log.to_vec(), vec![sample(6), sample(7), sample(8), sample(9)]);
    }

    #[test]
    fn test_persist_and_restore() {
        let config = FlowConfig::default();
        let mut store = MemoryStore::new();
        let mut logs = FlowLogs::new(&config);
        let now = Utc::now();

        logs.history.push(sample(1));
        logs.moods.push(MoodEntry { timestamp: now, mood: Mood::Stuck });
        logs.events.push(ClassifiedEvent::new(EventType::Insert, now, serde_json::json!({})));
        logs.persist_history(&mut store);
        logs.persist_moods(&mut store);
        logs.persist_events(&mut store);

        let restored = FlowLogs::restore(&config, &store);
        assert_eq!(restored.bundle(), logs.bundle());
    }

    #[test]
    fn test_restore_rebounds_to_cap() {
        let mut config = FlowConfig::default();
        let mut store = MemoryStore::new();
        let samples: Vec<FlowSample> = (0..30).map(sample).collect();
        crate::store::save(&mut store, HISTORY_KEY, &samples).unwrap();

        config.history_cap = 10;
        let restored = FlowLogs::restore(&config, &store);
        assert_eq!(restored.history.len(), 10);
        assert_eq!(restored.history.first(), Some(&sample(20)));
    }

    #[test]
    fn test_restore_skips_corrupt_entries() {
        let mut store = MemoryStore::new();
        store.set(MOODS_KEY, serde_json::json!({ "not": "a list" })).unwrap();
        let restored = FlowLogs::restore(&FlowConfig::default(), &store);
        assert!(restored.moods.is_empty());
    }
}

//! Core data types for the flow pipeline
//!
//! These types describe what flows through the pipeline: raw change
//! notifications from the host, the activity window, the metrics aggregate,
//! and the append-only records (classified events, mood reports, flow samples).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One sub-change within a host text-change notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChange {
    /// Inserted text (absent is treated as empty)
    #[serde(default)]
    pub text: Option<String>,
    /// Length of the replaced range (absent is treated as zero)
    #[serde(default)]
    pub range_length: Option<usize>,
}

impl SubChange {
    /// Build a sub-change from inserted text and removed range length
    pub fn new(text: impl Into<String>, range_length: usize) -> Self {
        Self {
            text: Some(text.into()),
            range_length: Some(range_length),
        }
    }

    /// Inserted text, empty when missing
    pub fn inserted_text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Number of inserted characters
    pub fn inserted_len(&self) -> usize {
        self.inserted_text().chars().count()
    }

    /// Number of removed characters
    pub fn removed_len(&self) -> usize {
        self.range_length.unwrap_or(0)
    }
}

/// A text-change notification as delivered by the host editor
///
/// One edit operation may batch several sub-changes (multi-cursor edits,
/// formatter passes). They are processed independently and in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// When the edit happened
    pub timestamp: DateTime<Utc>,
    /// Sub-changes in arrival order
    #[serde(default)]
    pub changes: Vec<SubChange>,
}

/// One insertion recorded in the sliding activity window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    /// Inserted characters
    pub size: usize,
}

/// Running counters maintained by the pipeline
///
/// Counters only grow, except `consecutive_low_flow_count` (reset by the nudge
/// machine) and `last_change_timestamp` (moved by edits and focus loss).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Inserted characters across all edits
    pub total_insertions: u64,
    /// Removed characters across all edits
    pub total_deletions: u64,
    /// Edits tagged `ai.accept` or `ai.replace`
    pub ai_insertions: u64,
    /// Suggestions the user explicitly rejected
    pub ai_rejections: u64,
    /// Removed characters from pure deletions
    pub undo_count: u64,
    /// Consecutive scoring ticks below the low-flow threshold
    pub consecutive_low_flow_count: u32,
    /// Last real edit, or the forced idle mark set on focus loss
    pub last_change_timestamp: DateTime<Utc>,
}

impl Metrics {
    /// Fresh counters with the idle clock starting at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_insertions: 0,
            total_deletions: 0,
            ai_insertions: 0,
            ai_rejections: 0,
            undo_count: 0,
            consecutive_low_flow_count: 0,
            last_change_timestamp: now,
        }
    }
}

/// Classified event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "insert")]
    Insert,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "replace")]
    Replace,
    #[serde(rename = "ai.accept")]
    AiAccept,
    #[serde(rename = "ai.replace")]
    AiReplace,
    #[serde(rename = "ai.reject")]
    AiReject,
    #[serde(rename = "mood.report")]
    MoodReport,
    #[serde(rename = "nudge")]
    Nudge,
    #[serde(rename = "assist.toggle")]
    AssistToggle,
    #[serde(rename = "export")]
    Export,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Insert => "insert",
            EventType::Delete => "delete",
            EventType::Replace => "replace",
            EventType::AiAccept => "ai.accept",
            EventType::AiReplace => "ai.replace",
            EventType::AiReject => "ai.reject",
            EventType::MoodReport => "mood.report",
            EventType::Nudge => "nudge",
            EventType::AssistToggle => "assist.toggle",
            EventType::Export => "export",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record in the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ClassifiedEvent {
    pub fn new(event_type: EventType, timestamp: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            timestamp,
            payload,
        }
    }
}

/// Self-reported mood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    Happy,
    Neutral,
    Stuck,
}

impl Mood {
    pub const ALL: [Mood; 3] = [Mood::Happy, Mood::Neutral, Mood::Stuck];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "Happy",
            Mood::Neutral => "Neutral",
            Mood::Stuck => "Stuck",
        }
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "happy" => Ok(Mood::Happy),
            "neutral" => Ok(Mood::Neutral),
            "stuck" => Ok(Mood::Stuck),
            other => Err(format!("unknown mood '{}'", other)),
        }
    }
}

/// A mood report created by explicit user action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub timestamp: DateTime<Utc>,
    pub mood: Mood,
}

/// One flow score reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSample {
    pub timestamp: DateTime<Utc>,
    pub score: u8,
}

/// The three choices offered by a nudge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeChoice {
    /// Take a break
    Break,
    /// Request a hint
    Hint,
    /// Ignore, or dismissed without a choice
    Ignored,
}

impl NudgeChoice {
    pub const OFFERED: [NudgeChoice; 3] = [NudgeChoice::Break, NudgeChoice::Hint, NudgeChoice::Ignored];

    pub fn as_str(&self) -> &'static str {
        match self {
            NudgeChoice::Break => "break",
            NudgeChoice::Hint => "hint",
            NudgeChoice::Ignored => "ignored",
        }
    }
}

impl FromStr for NudgeChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "break" | "take a break" => Ok(NudgeChoice::Break),
            "hint" | "request a hint" => Ok(NudgeChoice::Hint),
            "ignore" | "ignored" => Ok(NudgeChoice::Ignored),
            other => Err(format!("unknown nudge choice '{}'", other)),
        }
    }
}

/// Coarse score band used for status colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowBand {
    High,
    Mid,
    Low,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_serialization() {
        let json = serde_json::to_string(&EventType::AiAccept).unwrap();
        assert_eq!(json, "\"ai.accept\"");

        let parsed: EventType = serde_json::from_str("\"assist.toggle\"").unwrap();
        assert_eq!(parsed, EventType::AssistToggle);
        assert_eq!(parsed.to_string(), "assist.toggle");
    }

    #[test]
    fn test_sub_change_missing_fields_are_zero() {
        let change: SubChange = serde_json::from_str("{}").unwrap();
        assert_eq!(change.inserted_len(), 0);
        assert_eq!(change.removed_len(), 0);
        assert_eq!(change.inserted_text(), "");
    }

    #[test]
    fn test_inserted_len_counts_chars() {
        let change = SubChange::new("héllo", 0);
        assert_eq!(change.inserted_len(), 5);
    }

    #[test]
    fn test_metrics_serialize_camel_case() {
        let now = Utc::now();
        let value = serde_json::to_value(Metrics::new(now)).unwrap();
        assert_eq!(value["totalInsertions"], 0);
        assert_eq!(value["consecutiveLowFlowCount"], 0);
        assert!(value["lastChangeTimestamp"].is_string());
    }

    #[test]
    fn test_classified_event_uses_type_key() {
        let event = ClassifiedEvent::new(
            EventType::Delete,
            Utc::now(),
            serde_json::json!({ "inserted": 0, "removed": 3 }),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "delete");
        assert_eq!(value["payload"]["removed"], 3);
    }

    #[test]
    fn test_mood_and_choice_parsing() {
        assert_eq!("happy".parse::<Mood>().unwrap(), Mood::Happy);
        assert_eq!(" Stuck ".parse::<Mood>().unwrap(), Mood::Stuck);
        assert!("sleepy".parse::<Mood>().is_err());

        assert_eq!("Take a break".parse::<NudgeChoice>().unwrap(), NudgeChoice::Break);
        assert_eq!("ignore".parse::<NudgeChoice>().unwrap(), NudgeChoice::Ignored);
        assert!("later".parse::<NudgeChoice>().is_err());
    }
}

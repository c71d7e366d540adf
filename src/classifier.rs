//! Edit classification
//!
//! Tags each sub-change of a host notification as a human or AI-assisted
//! insert, delete or replace. The AI tag is a size/newline heuristic (large
//! or multi-line insertions look pasted or generated), not ground truth.

use crate::config::DEFAULT_AI_INSERT_THRESHOLD;
use crate::types::{ChangeEvent, EventType, SubChange};

/// Result of classifying one sub-change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedEdit {
    pub kind: EventType,
    /// Inserted characters
    pub inserted: usize,
    /// Removed characters
    pub removed: usize,
}

impl ClassifiedEdit {
    /// Whether the heuristic attributed this edit to an AI assistant
    pub fn is_ai(&self) -> bool {
        matches!(self.kind, EventType::AiAccept | EventType::AiReplace)
    }

    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "inserted": self.inserted,
            "removed": self.removed,
        })
    }
}

/// Stateless edit classifier
#[derive(Debug, Clone, Copy)]
pub struct EditClassifier {
    ai_threshold: usize,
}

impl Default for EditClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_AI_INSERT_THRESHOLD)
    }
}

impl EditClassifier {
    /// `ai_threshold`: insertions strictly longer than this are tagged AI
    pub fn new(ai_threshold: usize) -> Self {
        Self { ai_threshold }
    }

    /// Classify one sub-change. No-op changes (nothing inserted or removed)
    /// produce no event.
    pub fn classify(&self, change: &SubChange) -> Option<ClassifiedEdit> {
        let inserted = change.inserted_len();
        let removed = change.removed_len();

        let kind = match (inserted > 0, removed > 0) {
            (true, false) if self.looks_generated(change.inserted_text(), inserted) => EventType::AiAccept,
            (true, false) => EventType::Insert,
            (false, true) => EventType::Delete,
            (true, true) if self.looks_generated(change.inserted_text(), inserted) => EventType::AiReplace,
            (true, true) => EventType::Replace,
            (false, false) => return None,
        };

        Some(ClassifiedEdit {
            kind,
            inserted,
            removed,
        })
    }

    /// Classify every sub-change of a notification, preserving order
    pub fn classify_all(&self, event: &ChangeEvent) -> Vec<ClassifiedEdit> {
        event.changes.iter().filter_map(|c| self.classify(c)).collect()
    }

    fn looks_generated(&self, text: &str, inserted: usize) -> bool {
        inserted > self.ai_threshold || text.contains('\n')
    }
}

//! Pending user decisions
//!
//! Prompts (nudge choices, mood picks) never block the pipeline. Issuing one
//! yields a [`PendingPrompt`] carrying a token; the host answers later by
//! submitting a [`Decision`] for that token. Answers wait in an inbox until
//! the session drains it, so they land after whatever edits arrived meanwhile.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::types::{Mood, NudgeChoice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Nudge,
    Mood,
}

/// A question put to the user, awaiting an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPrompt {
    pub token: Uuid,
    pub kind: PromptKind,
    pub issued_at: DateTime<Utc>,
    /// Choices the host should present, in order
    pub options: Vec<String>,
}

/// An answer from the host. `choice: None` means dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub token: Uuid,
    #[serde(default)]
    pub choice: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// A decision matched to the prompt it answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedDecision {
    Nudge {
        choice: NudgeChoice,
        received_at: DateTime<Utc>,
    },
    /// `None` when dismissed or unparseable
    Mood {
        mood: Option<Mood>,
        received_at: DateTime<Utc>,
    },
}

/// Outstanding prompts plus the inbox of answers
#[derive(Debug, Default)]
pub struct DecisionQueue {
    pending: HashMap<Uuid, PendingPrompt>,
    inbox: VecDeque<Decision>,
}

impl DecisionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new prompt and return it for presentation
    pub fn issue(&mut self, kind: PromptKind, now: DateTime<Utc>) -> PendingPrompt {
        let options = match kind {
            PromptKind::Nudge => NudgeChoice::OFFERED.iter().map(|c| c.as_str().to_string()).collect(),
            PromptKind::Mood => Mood::ALL.iter().map(|m| m.as_str().to_string()).collect(),
        };
        let prompt = PendingPrompt {
            token: Uuid::new_v4(),
            kind,
            issued_at: now,
            options,
        };
        self.pending.insert(prompt.token, prompt.clone());
        prompt
    }

    /// Queue an answer; it is matched to its prompt on the next drain
    pub fn submit(&mut self, decision: Decision) {
        self.inbox.push_back(decision);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Match queued answers to prompts, in arrival order. Answers for unknown
    /// or already-answered tokens are dropped.
    pub fn drain(&mut self) -> Vec<ResolvedDecision> {
        let mut resolved = Vec::with_capacity(self.inbox.len());

        while let Some(decision) = self.inbox.pop_front() {
            let Some(prompt) = self.pending.remove(&decision.token) else {
                warn!("Dropping decision for unknown prompt {}", decision.token);
                continue;
            };

            resolved.push(match prompt.kind {
                PromptKind::Nudge => ResolvedDecision::Nudge {
                    choice: parse_nudge_choice(decision.choice.as_deref()),
                    received_at: decision.received_at,
                },
                PromptKind::Mood => ResolvedDecision::Mood {
                    mood: parse_mood(decision.choice.as_deref()),
                    received_at: decision.received_at,
                },
            });
        }

        resolved
    }
}

fn parse_nudge_choice(choice: Option<&str>) -> NudgeChoice {
    match choice {
        None => NudgeChoice::Ignored,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Treating nudge answer as ignored: {}", e);
            NudgeChoice::Ignored
        }),
    }
}

fn parse_mood(choice: Option<&str>) -> Option<Mood> {
    let raw = choice?;
    match raw.parse() {
        Ok(mood) => Some(mood),
        Err(e) => {
            warn!("Discarding mood answer: {}", e);
            None
        }
    }
}

//! Pipeline configuration
//!
//! Every tunable of the classifier, scorer, nudge machine and logs lives here.
//! All fields default, so a partial JSON document only overrides what it names.

use crate::error::VibeflowError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Insertions longer than this many characters are tagged as AI-generated
pub const DEFAULT_AI_INSERT_THRESHOLD: usize = 40;

/// Maximum number of flow samples kept in history
pub const DEFAULT_HISTORY_CAP: usize = 20_000;

/// Scorer constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Entries older than this do not contribute to the keystroke term
    pub keystroke_window_ms: i64,
    /// Per-entry size cap in the keystroke sum
    pub entry_size_cap: usize,
    /// Cap on the keystroke term
    pub keystroke_cap: f64,
    /// Rhythm bonus applies only when the mean gap is below this
    pub rhythm_gap_threshold_ms: f64,
    /// Rhythm bonus ceiling
    pub rhythm_max: f64,
    /// Cap on the idle penalty (seconds)
    pub idle_cap: f64,
    pub outcome_base: f64,
    pub accept_weight: f64,
    pub undo_weight: f64,
    /// Symmetric jitter amplitude
    pub jitter_amplitude: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            keystroke_window_ms: 60_000,
            entry_size_cap: 20,
            keystroke_cap: 50.0,
            rhythm_gap_threshold_ms: 10_000.0,
            rhythm_max: 20.0,
            idle_cap: 50.0,
            outcome_base: 30.0,
            accept_weight: 30.0,
            undo_weight: 10.0,
            jitter_amplitude: 3.0,
        }
    }
}

/// Nudge state machine thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    /// Scores at or above this are "high" flow
    pub high_threshold: u8,
    /// Scores below this count toward a nudge
    pub low_threshold: u8,
    /// Consecutive low readings needed to fire
    pub streak: u32,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            high_threshold: 70,
            low_threshold: 45,
            streak: 5,
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub scorer: ScorerConfig,
    pub nudge: NudgeConfig,
    /// AI heuristic length threshold
    pub ai_insert_threshold: usize,
    /// Max age of activity entries
    pub activity_window_ms: i64,
    /// How far back the idle mark is moved when the editor loses focus
    pub focus_loss_idle_ms: i64,
    /// Minimum spacing between two score evaluations
    pub tick_interval_ms: i64,
    pub history_cap: usize,
    pub event_cap: usize,
    pub mood_cap: usize,
    /// Number of most recent samples sent to the dashboard
    pub dashboard_history_len: usize,
    /// Delay before the fallback dashboard push
    pub dashboard_fallback_ms: i64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            scorer: ScorerConfig::default(),
            nudge: NudgeConfig::default(),
            ai_insert_threshold: DEFAULT_AI_INSERT_THRESHOLD,
            activity_window_ms: 5 * 60 * 1000,
            focus_loss_idle_ms: 120_000,
            tick_interval_ms: 1000,
            history_cap: DEFAULT_HISTORY_CAP,
            event_cap: 20_000,
            mood_cap: 20_000,
            dashboard_history_len: 1000,
            dashboard_fallback_ms: 1500,
        }
    }
}

impl FlowConfig {
    /// Parse a configuration document and validate it
    pub fn from_json(json: &str) -> Result<Self, VibeflowError> {
        let config: FlowConfig = serde_json::from_str(json)
            .map_err(|e| VibeflowError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, VibeflowError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            VibeflowError::Config(format!("Failed to read config from {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn to_json(&self) -> Result<String, VibeflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), VibeflowError> {
        if self.nudge.low_threshold > self.nudge.high_threshold {
            return Err(VibeflowError::Config(format!(
                "low_threshold ({}) must not exceed high_threshold ({})",
                self.nudge.low_threshold, self.nudge.high_threshold
            )));
        }
        if self.nudge.high_threshold > 100 {
            return Err(VibeflowError::Config(
                "high_threshold must be within 0-100".to_string(),
            ));
        }
        if self.nudge.streak == 0 {
            return Err(VibeflowError::Config("nudge streak must be positive".to_string()));
        }
        for (name, cap) in [
            ("history_cap", self.history_cap),
            ("event_cap", self.event_cap),
            ("mood_cap", self.mood_cap),
        ] {
            if cap == 0 {
                return Err(VibeflowError::Config(format!("{} must be positive", name)));
            }
        }
        if self.scorer.keystroke_window_ms <= 0 || self.activity_window_ms <= 0 {
            return Err(VibeflowError::Config("windows must be positive".to_string()));
        }
        if self.scorer.keystroke_window_ms > self.activity_window_ms {
            return Err(VibeflowError::Config(
                "keystroke window cannot exceed the activity window".to_string(),
            ));
        }
        if self.tick_interval_ms < 0 || self.dashboard_fallback_ms < 0 || self.focus_loss_idle_ms < 0 {
            return Err(VibeflowError::Config("durations must not be negative".to_string()));
        }
        if self.scorer.jitter_amplitude < 0.0 {
            return Err(VibeflowError::Config("jitter amplitude must not be negative".to_string()));
        }
        Ok(())
    }
}

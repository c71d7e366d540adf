//! Low-flow nudge state machine
//!
//! Counts consecutive low scores and fires a nudge once the streak reaches
//! the configured length, provided assist mode is on. With assist off the
//! streak keeps growing silently, so turning assist back on during a slump
//! fires on the next low reading.

use crate::config::NudgeConfig;
use crate::types::FlowBand;
use serde::{Deserialize, Serialize};

/// Machine state between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeState {
    Normal,
    LowFlowAccumulating,
    /// Only ever reported by a transition; the machine settles back to Normal
    Nudged,
}

/// Outcome of feeding one score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgeTransition {
    /// State reported for this tick (`Nudged` when a nudge fired)
    pub state: NudgeState,
    pub band: FlowBand,
    /// Streak length after this tick
    pub consecutive_low: u32,
    pub fired: bool,
}

#[derive(Debug, Clone)]
pub struct NudgeStateMachine {
    config: NudgeConfig,
    state: NudgeState,
    consecutive_low: u32,
}

impl NudgeStateMachine {
    pub fn new(config: NudgeConfig) -> Self {
        Self {
            config,
            state: NudgeState::Normal,
            consecutive_low: 0,
        }
    }

    pub fn state(&self) -> NudgeState {
        self.state
    }

    pub fn consecutive_low(&self) -> u32 {
        self.consecutive_low
    }

    /// Band used for status colouring
    pub fn band(&self, score: u8) -> FlowBand {
        if score >= self.config.high_threshold {
            FlowBand::High
        } else if score >= self.config.low_threshold {
            FlowBand::Mid
        } else {
            FlowBand::Low
        }
    }

    /// Feed one evaluated score
    pub fn observe(&mut self, score: u8, assist_enabled: bool) -> NudgeTransition {
        let band = self.band(score);

        if band != FlowBand::Low {
            self.consecutive_low = 0;
            self.state = NudgeState::Normal;
            return NudgeTransition {
                state: self.state,
                band,
                consecutive_low: 0,
                fired: false,
            };
        }

        self.consecutive_low = self.consecutive_low.saturating_add(1);
        self.state = NudgeState::LowFlowAccumulating;

        if assist_enabled && self.consecutive_low >= self.config.streak {
            self.consecutive_low = 0;
            self.state = NudgeState::Normal;
            return NudgeTransition {
                state: NudgeState::Nudged,
                band,
                consecutive_low: 0,
                fired: true,
            };
        }

        NudgeTransition {
            state: self.state,
            band,
            consecutive_low: self.consecutive_low,
            fired: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> NudgeStateMachine {
        NudgeStateMachine::new(NudgeConfig::default())
    }

    #[test]
    fn test_fires_exactly_on_fifth_low_tick() {
        let mut m = machine();
        for tick in 1..=4 {
            let t = m.observe(30, true);
            assert!(!t.fired, "fired early on tick {}", tick);
            assert_eq!(t.consecutive_low, tick);
            assert_eq!(t.state, NudgeState::LowFlowAccumulating);
        }

        let t = m.observe(30, true);
        assert!(t.fired);
        assert_eq!(t.state, NudgeState::Nudged);
        assert_eq!(t.consecutive_low, 0);
        assert_eq!(m.state(), NudgeState::Normal);
        assert_eq!(m.consecutive_low(), 0);
    }

    #[test]
    fn test_mid_and_high_scores_reset_streak() {
        let mut m = machine();
        m.observe(10, true);
        m.observe(10, true);

        let t = m.observe(45, true);
        assert_eq!(t.band, FlowBand::Mid);
        assert_eq!(t.consecutive_low, 0);
        assert_eq!(m.state(), NudgeState::Normal);

        m.observe(10, true);
        let t = m.observe(90, true);
        assert_eq!(t.band, FlowBand::High);
        assert_eq!(m.consecutive_low(), 0);
    }

    #[test]
    fn test_no_nudge_when_assist_disabled() {
        let mut m = machine();
        for _ in 0..8 {
            assert!(!m.observe(20, false).fired);
        }
        assert_eq!(m.consecutive_low(), 8);

        // enabling assist mid-slump fires on the next low reading
        assert!(m.observe(20, true).fired);
    }

    #[test]
    fn test_band_edges() {
        let m = machine();
        assert_eq!(m.band(44), FlowBand::Low);
        assert_eq!(m.band(45), FlowBand::Mid);
        assert_eq!(m.band(69), FlowBand::Mid);
        assert_eq!(m.band(70), FlowBand::High);
    }
}

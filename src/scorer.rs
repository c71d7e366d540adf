//! Flow scoring
//!
//! Computes a bounded 0-100 flow score from the activity window and the
//! accumulated metrics. The score combines four terms:
//!
//! ```text
//! raw   = keystroke + rhythm - idle + outcome + jitter
//! score = round(clamp(raw, 0, 100))
//! ```
//!
//! The jitter is deliberate noise (±3 by default) that keeps the number from
//! being perfectly reproducible and therefore gameable. It comes from an
//! injected [`Jitter`] so tests can pin it to zero.

use crate::config::ScorerConfig;
use crate::types::{ActivityEntry, Metrics};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Source of the symmetric score noise
pub trait Jitter: Send {
    /// Return a value in `[-amplitude, amplitude]`
    fn sample(&mut self, amplitude: f64) -> f64;
}

/// No noise at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn sample(&mut self, _amplitude: f64) -> f64 {
        0.0
    }
}

/// Constant noise, clamped to the amplitude
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn sample(&mut self, amplitude: f64) -> f64 {
        self.0.clamp(-amplitude, amplitude)
    }
}

/// Uniform noise from a seedable RNG
pub struct UniformJitter {
    rng: StdRng,
}

impl UniformJitter {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for UniformJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Jitter for UniformJitter {
    fn sample(&mut self, amplitude: f64) -> f64 {
        if amplitude <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-amplitude..=amplitude)
    }
}

/// Every term of one score evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keystroke: f64,
    pub rhythm: f64,
    pub idle: f64,
    pub outcome: f64,
    pub jitter: f64,
    /// Sum before clamping
    pub raw: f64,
    pub score: u8,
}

/// Pure scoring function over metrics, activity and time
#[derive(Debug, Clone, Default)]
pub struct FlowScorer {
    config: ScorerConfig,
}

impl FlowScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Score with noise drawn from `jitter`
    pub fn score(
        &self,
        metrics: &Metrics,
        activity: &VecDeque<ActivityEntry>,
        now: DateTime<Utc>,
        jitter: &mut dyn Jitter,
    ) -> ScoreBreakdown {
        let noise = jitter.sample(self.config.jitter_amplitude);
        self.breakdown(metrics, activity, now, noise)
    }

    /// Score with an explicit noise value
    pub fn breakdown(
        &self,
        metrics: &Metrics,
        activity: &VecDeque<ActivityEntry>,
        now: DateTime<Utc>,
        jitter: f64,
    ) -> ScoreBreakdown {
        let window_ms = self.config.keystroke_window_ms;
        let recent: Vec<&ActivityEntry> = activity
            .iter()
            .filter(|e| age_ms(e.timestamp, now) <= window_ms)
            .collect();

        let keystroke = compute_keystroke(&recent, now, &self.config);
        let rhythm = compute_rhythm(&recent, &self.config);

        let last_activity = activity.back().map(|e| e.timestamp);
        let reference = match last_activity {
            Some(ts) if ts > metrics.last_change_timestamp => ts,
            _ => metrics.last_change_timestamp,
        };
        let idle = compute_idle(age_ms(reference, now), self.config.idle_cap);
        let outcome = compute_outcome(metrics, &self.config);

        let raw = keystroke + rhythm - idle + outcome + jitter;

        ScoreBreakdown {
            keystroke,
            rhythm,
            idle,
            outcome,
            jitter,
            raw,
            score: finalize(raw),
        }
    }
}

fn age_ms(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - timestamp).num_milliseconds().max(0)
}

/// Keystroke term
///
/// Formula: `min(cap, Σ max(0, 1 - age/window) * min(size, size_cap))`
/// Recent insertions weigh more; each entry's size is capped so a single
/// paste cannot dominate.
fn compute_keystroke(recent: &[&ActivityEntry], now: DateTime<Utc>, config: &ScorerConfig) -> f64 {
    let window = config.keystroke_window_ms as f64;
    let sum: f64 = recent
        .iter()
        .map(|e| {
            let weight = (1.0 - age_ms(e.timestamp, now) as f64 / window).max(0.0);
            weight * e.size.min(config.entry_size_cap) as f64
        })
        .sum();
    sum.min(config.keystroke_cap)
}

/// Rhythm bonus
///
/// Formula: `max(0, rhythm_max - mean_gap_sec)` when the mean inter-entry gap
/// is below the threshold, else 0. Needs at least two entries.
fn compute_rhythm(recent: &[&ActivityEntry], config: &ScorerConfig) -> f64 {
    if recent.len() < 2 {
        return 0.0;
    }
    let gaps: Vec<f64> = recent
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds().max(0) as f64)
        .collect();
    let mean_gap_ms = gaps.iter().sum::<f64>() / gaps.len() as f64;

    if mean_gap_ms < config.rhythm_gap_threshold_ms {
        (config.rhythm_max - mean_gap_ms / 1000.0).max(0.0)
    } else {
        0.0
    }
}

/// Idle penalty: one point per idle second, capped
fn compute_idle(idle_ms: i64, cap: f64) -> f64 {
    (idle_ms as f64 / 1000.0).min(cap)
}

/// Outcome term
///
/// Formula: `base + accept_rate * accept_weight - undo_penalty * undo_weight`
/// where both rates are relative to total inserted characters and capped at 1.
fn compute_outcome(metrics: &Metrics, config: &ScorerConfig) -> f64 {
    let denominator = metrics.total_insertions.max(1) as f64;
    let accept_rate = (metrics.ai_insertions as f64 / denominator).min(1.0);
    let undo_penalty = (metrics.undo_count as f64 / denominator).min(1.0);
    config.outcome_base + accept_rate * config.accept_weight - undo_penalty * config.undo_weight
}

/// Clamp to [0, 100] and round half up
fn finalize(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    (raw.clamp(0.0, 100.0) + 0.5).floor().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn entry(seconds_ago: i64, size: usize) -> ActivityEntry {
        ActivityEntry {
            timestamp: now() - Duration::seconds(seconds_ago),
            size,
        }
    }

    fn metrics_with(total: u64, ai: u64, undo: u64) -> Metrics {
        Metrics {
            total_insertions: total,
            ai_insertions: ai,
            undo_count: undo,
            ..Metrics::new(now())
        }
    }

    #[test]
    fn test_outcome_end_to_end() {
        let scorer = FlowScorer::default();
        let metrics = metrics_with(100, 80, 5);
        let result = scorer.breakdown(&metrics, &VecDeque::new(), now(), 0.0);

        assert!((result.outcome - 53.5).abs() < 1e-9);
        assert_eq!(result.keystroke, 0.0);
        assert_eq!(result.rhythm, 0.0);
        assert_eq!(result.idle, 0.0);
        assert_eq!(result.score, 54);
    }

    #[test]
    fn test_outcome_with_jitter_stays_in_band() {
        let scorer = FlowScorer::default();
        let metrics = metrics_with(100, 80, 5);
        for seed in 0..50 {
            let mut jitter = UniformJitter::seeded(seed);
            let result = scorer.score(&metrics, &VecDeque::new(), now(), &mut jitter);
            assert!((51..=57).contains(&result.score), "score {}", result.score);
        }
    }

    #[test]
    fn test_same_second_is_idempotent_without_jitter() {
        let scorer = FlowScorer::default();
        let metrics = metrics_with(50, 3, 2);
        let activity: VecDeque<_> = vec![entry(20, 4), entry(10, 6), entry(2, 3)].into();

        let first = scorer.score(&metrics, &activity, now(), &mut NoJitter);
        let second = scorer.score(&metrics, &activity, now(), &mut NoJitter);
        assert_eq!(first, second);
    }

    #[test]
    fn test_keystroke_decays_and_caps_entry_size() {
        let scorer = FlowScorer::default();
        let activity: VecDeque<_> = vec![entry(30, 30)].into();
        let result = scorer.breakdown(&metrics_with(0, 0, 0), &activity, now(), 0.0);
        // weight 0.5, size capped at 20
        assert!((result.keystroke - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_keystroke_ignores_entries_outside_window() {
        let scorer = FlowScorer::default();
        let activity: VecDeque<_> = vec![entry(90, 20)].into();
        let result = scorer.breakdown(&metrics_with(0, 0, 0), &activity, now(), 0.0);
        assert_eq!(result.keystroke, 0.0);
        assert_eq!(result.rhythm, 0.0);
    }

    #[test]
    fn test_keystroke_term_is_capped() {
        let scorer = FlowScorer::default();
        let activity: VecDeque<_> = (0..20).map(|i| entry(20 - i, 20)).collect();
        let result = scorer.breakdown(&metrics_with(0, 0, 0), &activity, now(), 0.0);
        assert_eq!(result.keystroke, 50.0);
    }

    #[test]
    fn test_rhythm_bonus_for_steady_typing() {
        let scorer = FlowScorer::default();
        let activity: VecDeque<_> = vec![entry(4, 1), entry(2, 1), entry(0, 1)].into();
        let result = scorer.breakdown(&metrics_with(0, 0, 0), &activity, now(), 0.0);
        assert!((result.rhythm - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_rhythm_for_slow_or_single_entries() {
        let scorer = FlowScorer::default();
        let single: VecDeque<_> = vec![entry(1, 1)].into();
        assert_eq!(scorer.breakdown(&metrics_with(0, 0, 0), &single, now(), 0.0).rhythm, 0.0);

        let slow: VecDeque<_> = vec![entry(40, 1), entry(20, 1), entry(0, 1)].into();
        assert_eq!(scorer.breakdown(&metrics_with(0, 0, 0), &slow, now(), 0.0).rhythm, 0.0);
    }

    #[test]
    fn test_idle_penalty_uses_latest_signal() {
        let scorer = FlowScorer::default();
        let mut metrics = metrics_with(0, 0, 0);
        metrics.last_change_timestamp = now() - Duration::seconds(120);

        let result = scorer.breakdown(&metrics, &VecDeque::new(), now(), 0.0);
        assert_eq!(result.idle, 50.0);

        let activity: VecDeque<_> = vec![entry(10, 1)].into();
        let result = scorer.breakdown(&metrics, &activity, now(), 0.0);
        assert!((result.idle - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_always_clamped() {
        let scorer = FlowScorer::default();
        let busy: VecDeque<_> = (0..60).map(|i| entry(59 - i, 50)).collect();
        let cases = vec![
            (metrics_with(0, 0, 0), VecDeque::new()),
            (metrics_with(1, 1_000, 0), busy.clone()),
            (metrics_with(1, 0, 1_000), VecDeque::new()),
            (
                Metrics {
                    last_change_timestamp: now() - Duration::days(3),
                    ..metrics_with(10, 0, 10)
                },
                VecDeque::new(),
            ),
        ];

        for (metrics, activity) in cases {
            for noise in [-3.0, 0.0, 3.0] {
                let result = scorer.score(&metrics, &activity, now(), &mut FixedJitter(noise));
                assert!(result.score <= 100);
            }
        }

        let maxed = scorer.breakdown(&metrics_with(1, 1_000, 0), &busy, now(), 3.0);
        assert_eq!(maxed.score, 100);

        let floor = scorer.breakdown(
            &Metrics {
                last_change_timestamp: now() - Duration::days(3),
                ..metrics_with(10, 0, 10)
            },
            &VecDeque::new(),
            now(),
            -3.0,
        );
        assert_eq!(floor.score, 0);
    }

    #[test]
    fn test_fixed_jitter_respects_amplitude() {
        assert_eq!(FixedJitter(10.0).sample(3.0), 3.0);
        assert_eq!(FixedJitter(-10.0).sample(3.0), -3.0);
        assert_eq!(UniformJitter::seeded(7).sample(0.0), 0.0);
    }

    #[test]
    fn test_finalize_rounds_half_up() {
        assert_eq!(finalize(53.5), 54);
        assert_eq!(finalize(53.49), 53);
        assert_eq!(finalize(-12.0), 0);
        assert_eq!(finalize(140.0), 100);
        assert_eq!(finalize(f64::NAN), 0);
    }
}

//! Autocorrelation-style tempo estimation from the onset stream
//!
//! Every onset is paired with the onsets of the preceding two seconds and
//! the inter-onset intervals are accumulated into a weighted histogram.
//! The heaviest in-range bin yields the BPM candidate; octave ambiguity is
//! broken towards the previous locked value, small changes are blended and
//! larger ones replace the estimate outright.

use std::collections::VecDeque;

use crate::{SampleTime, SAMPLE_RATE};

/// Default tempo search range
pub const DEFAULT_MIN_BPM: f32 = 75.0;
/// Default tempo search range
pub const DEFAULT_MAX_BPM: f32 = 200.0;

/// Histogram bin width in seconds
const BIN_WIDTH_S: f32 = 0.010;

/// Onsets older than this are not paired with new ones
const PAIRING_WINDOW_S: f32 = 2.0;

/// Per-onset decay applied to the whole histogram
const HISTOGRAM_DECAY: f32 = 0.9;

/// Relative deviation below which a candidate blends instead of replacing
const BLEND_WINDOW: f32 = 0.05;

/// Old/new blend weights inside the window
const BLEND_OLD: f32 = 0.7;

/// Estimate goes stale after this long without an onset
const STALE_AFTER_S: f32 = 5.0;

/// Current tempo estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEstimate {
    /// Estimated tempo; `None` until enough onsets arrived
    pub bpm: Option<f32>,
    /// Normalised histogram support in [0, 1]
    pub confidence: f32,
    /// Sample time of the last estimator update
    pub last_updated: SampleTime,
    /// True when no onset arrived for 5 s
    pub stale: bool,
}

impl Default for BeatEstimate {
    fn default() -> Self {
        Self {
            bpm: None,
            confidence: 0.0,
            last_updated: 0,
            stale: false,
        }
    }
}

/// Weighted inter-onset-interval histogram with range constraint
pub struct TempoEstimator {
    min_bpm: f32,
    max_bpm: f32,
    /// Interval range corresponding to the BPM bounds
    min_interval: f32,
    max_interval: f32,
    weights: Vec<f32>,
    weighted_intervals: Vec<f32>,
    recent_onsets: VecDeque<SampleTime>,
    last_onset: Option<SampleTime>,
    estimate: BeatEstimate,
}

impl TempoEstimator {
    /// Create an estimator with the default range
    pub fn new() -> Self {
        Self::with_range(DEFAULT_MIN_BPM, DEFAULT_MAX_BPM)
    }

    /// Create an estimator constrained to `[min_bpm, max_bpm]`
    pub fn with_range(min_bpm: f32, max_bpm: f32) -> Self {
        let mut estimator = Self {
            min_bpm: 0.0,
            max_bpm: 0.0,
            min_interval: 0.0,
            max_interval: 0.0,
            weights: Vec::new(),
            weighted_intervals: Vec::new(),
            recent_onsets: VecDeque::new(),
            last_onset: None,
            estimate: BeatEstimate::default(),
        };
        estimator.set_range(min_bpm, max_bpm);
        estimator
    }

    /// Lower BPM bound
    pub fn min_bpm(&self) -> f32 {
        self.min_bpm
    }

    /// Upper BPM bound
    pub fn max_bpm(&self) -> f32 {
        self.max_bpm
    }

    /// Reconfigure the range; resets the histogram
    pub fn set_range(&mut self, min_bpm: f32, max_bpm: f32) {
        let min_bpm = min_bpm.clamp(30.0, 299.0);
        let max_bpm = max_bpm.clamp(min_bpm + 1.0, 300.0);
        self.min_bpm = min_bpm;
        self.max_bpm = max_bpm;
        self.min_interval = 60.0 / max_bpm;
        self.max_interval = 60.0 / min_bpm;
        let bins = ((self.max_interval - self.min_interval) / BIN_WIDTH_S).ceil() as usize + 1;
        self.weights = vec![0.0; bins];
        self.weighted_intervals = vec![0.0; bins];
        self.recent_onsets.clear();
    }

    /// Wipe all learned state
    pub fn reset(&mut self) {
        self.weights.fill(0.0);
        self.weighted_intervals.fill(0.0);
        self.recent_onsets.clear();
        self.last_onset = None;
        self.estimate = BeatEstimate::default();
    }

    /// Current estimate
    pub fn estimate(&self) -> BeatEstimate {
        self.estimate
    }

    /// Feed one detected onset
    pub fn on_onset(&mut self, t: SampleTime) {
        self.last_onset = Some(t);

        // Age out onsets beyond the pairing window.
        let horizon = (PAIRING_WINDOW_S * SAMPLE_RATE as f32) as u64;
        while let Some(&front) = self.recent_onsets.front() {
            if t.saturating_sub(front) > horizon {
                self.recent_onsets.pop_front();
            } else {
                break;
            }
        }

        for v in self.weights.iter_mut() {
            *v *= HISTOGRAM_DECAY;
        }
        for v in self.weighted_intervals.iter_mut() {
            *v *= HISTOGRAM_DECAY;
        }

        for &prev in &self.recent_onsets {
            let interval = t.saturating_sub(prev) as f32 / SAMPLE_RATE as f32;
            if interval < self.min_interval || interval > self.max_interval {
                continue;
            }
            let idx = (((interval - self.min_interval) / BIN_WIDTH_S).round() as usize)
                .min(self.weights.len() - 1);
            let weight = (-interval / PAIRING_WINDOW_S).exp();
            self.weights[idx] += weight;
            self.weighted_intervals[idx] += weight * interval;
        }

        self.recent_onsets.push_back(t);
        self.update_estimate(t);
    }

    /// Advance staleness; call every tick
    pub fn refresh(&mut self, now: SampleTime) {
        let stale_after = (STALE_AFTER_S * SAMPLE_RATE as f32) as u64;
        self.estimate.stale = match self.last_onset {
            Some(at) => now.saturating_sub(at) > stale_after,
            None => self.estimate.bpm.is_some(),
        };
    }

    fn update_estimate(&mut self, now: SampleTime) {
        let total: f32 = self.weights.iter().sum();
        if total <= 0.0 {
            return;
        }
        let (best_idx, &best_weight) = self
            .weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).expect("weights are finite"))
            .expect("histogram is non-empty");
        if best_weight <= 0.0 {
            return;
        }

        let interval = self.weighted_intervals[best_idx] / best_weight;
        let mut candidate = 60.0 / interval;

        // Octave disambiguation: prefer the variant closest to the lock.
        if let Some(previous) = self.estimate.bpm {
            candidate = [candidate * 0.5, candidate, candidate * 2.0]
                .into_iter()
                .filter(|bpm| (self.min_bpm..=self.max_bpm).contains(bpm))
                .min_by(|a, b| {
                    (a - previous)
                        .abs()
                        .partial_cmp(&(b - previous).abs())
                        .expect("bpm values are finite")
                })
                .unwrap_or(candidate);
        }

        let confidence = (best_weight / total).clamp(0.0, 1.0);
        match self.estimate.bpm {
            Some(previous) if (candidate - previous).abs() / previous <= BLEND_WINDOW => {
                self.estimate.bpm = Some(BLEND_OLD * previous + (1.0 - BLEND_OLD) * candidate);
                self.estimate.confidence = confidence;
            }
            Some(_) => {
                // Tempo jump: replace outright, confidence starts over.
                self.estimate.bpm = Some(candidate);
                self.estimate.confidence = 0.0;
            }
            None => {
                self.estimate.bpm = Some(candidate);
                self.estimate.confidence = confidence;
            }
        }
        self.estimate.last_updated = now;
        self.estimate.stale = false;
    }
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(seconds: f32) -> SampleTime {
        (seconds * SAMPLE_RATE as f32) as SampleTime
    }

    /// Feed a constant-interval onset train; returns the estimate
    fn feed_train(estimator: &mut TempoEstimator, period_s: f32, count: usize) -> BeatEstimate {
        for i in 0..count {
            estimator.on_onset(samples(i as f32 * period_s));
        }
        estimator.estimate()
    }

    #[test]
    fn test_constant_train_converges() {
        // Property: |bpm - 60/T| <= 1 after at most 8 onsets.
        for bpm in [80.0f32, 120.0, 174.0] {
            let mut estimator = TempoEstimator::new();
            let estimate = feed_train(&mut estimator, 60.0 / bpm, 8);
            let got = estimate.bpm.expect("estimate after 8 onsets");
            assert!(
                (got - bpm).abs() <= 1.0,
                "expected ~{bpm}, got {got} (confidence {})",
                estimate.confidence
            );
        }
    }

    #[test]
    fn test_no_estimate_without_onsets() {
        let estimator = TempoEstimator::new();
        assert_eq!(estimator.estimate().bpm, None);
    }

    #[test]
    fn test_out_of_range_intervals_ignored() {
        let mut estimator = TempoEstimator::new();
        // 30 BPM train: 2 s intervals, outside [75, 200].
        let estimate = feed_train(&mut estimator, 2.0, 6);
        assert_eq!(estimate.bpm, None);
    }

    #[test]
    fn test_small_change_blends() {
        let mut estimator = TempoEstimator::new();
        feed_train(&mut estimator, 0.5, 8);
        let locked = estimator.estimate().bpm.unwrap();

        // 2% faster: inside the blend window, estimate moves smoothly.
        let t0 = samples(8.0 * 0.5);
        let period = samples(0.49);
        estimator.on_onset(t0 + period);
        let after = estimator.estimate().bpm.unwrap();
        assert!(after >= locked - 0.1, "blend must not jump down");
        assert!((after - locked).abs() < 5.0, "blend must be gradual");
    }

    #[test]
    fn test_large_change_replaces_and_resets_confidence() {
        let mut estimator = TempoEstimator::new();
        feed_train(&mut estimator, 0.5, 8); // 120 BPM
        assert!(estimator.estimate().confidence > 0.0);

        // Jump to 90 BPM (interval 0.667 s): well outside 5%.
        let mut t = samples(4.0);
        for _ in 0..8 {
            t += samples(60.0 / 90.0);
            estimator.on_onset(t);
        }
        let estimate = estimator.estimate();
        let got = estimate.bpm.unwrap();
        assert!(
            (got - 90.0).abs() <= 2.0,
            "estimator must follow the new tempo, got {got}"
        );
    }

    #[test]
    fn test_staleness_after_five_seconds() {
        let mut estimator = TempoEstimator::new();
        feed_train(&mut estimator, 0.5, 8);
        let last = samples(8.0 * 0.5);

        estimator.refresh(last + samples(4.0));
        assert!(!estimator.estimate().stale);

        estimator.refresh(last + samples(5.5));
        assert!(estimator.estimate().stale);

        // A fresh onset revives it.
        estimator.on_onset(last + samples(6.0));
        estimator.refresh(last + samples(6.0));
        assert!(!estimator.estimate().stale);
    }

    #[test]
    fn test_octave_lock_prefers_previous() {
        let mut estimator = TempoEstimator::new();
        feed_train(&mut estimator, 60.0 / 100.0, 10); // lock at 100 BPM
        let locked = estimator.estimate().bpm.unwrap();
        assert!((locked - 100.0).abs() <= 1.0);

        // Inject a half-tempo pattern briefly; 200 BPM variant of the 0.6 s
        // candidate is out of reach, so the lock should stay near 100.
        let t0 = samples(10.0 * 0.6);
        estimator.on_onset(t0 + samples(1.2));
        let after = estimator.estimate().bpm.unwrap();
        assert!(after > 60.0, "estimate collapsed to {after}");
    }

    #[test]
    fn test_set_range_validates_and_resets() {
        let mut estimator = TempoEstimator::new();
        feed_train(&mut estimator, 0.5, 8);
        estimator.set_range(60.0, 180.0);
        assert_eq!(estimator.min_bpm(), 60.0);
        assert_eq!(estimator.max_bpm(), 180.0);

        // Degenerate ranges are repaired.
        estimator.set_range(500.0, 10.0);
        assert!(estimator.min_bpm() < estimator.max_bpm());
    }
}

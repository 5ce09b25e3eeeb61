//! Beat tracking: onset detection, tempo estimation and OSC output

pub mod controller;
pub mod onset;
pub mod tempo;

use std::collections::VecDeque;

use crate::{SampleTime, SAMPLE_RATE};

pub use controller::BpmOscController;
pub use onset::{OnsetTracker, ONSET_HISTORY_LEN};
pub use tempo::{BeatEstimate, TempoEstimator, DEFAULT_MAX_BPM, DEFAULT_MIN_BPM};

/// Taps further apart than this start a new measurement
const TAP_TIMEOUT_S: f32 = 2.5;

/// Intervals averaged for the manual tempo
const TAP_WINDOW: usize = 4;

/// Manual tap-tempo input
///
/// Each tap records a timestamp; two or more close taps produce a tempo
/// from the mean of the recent intervals. The engine lets a tap override
/// the automatic estimate until the estimator locks again.
#[derive(Debug, Default)]
pub struct TapTempo {
    taps: VecDeque<SampleTime>,
}

impl TapTempo {
    /// Create an empty tap tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap; returns the manual BPM once derivable
    pub fn tap(&mut self, now: SampleTime) -> Option<f32> {
        let timeout = (TAP_TIMEOUT_S * SAMPLE_RATE as f32) as u64;
        if let Some(&last) = self.taps.back() {
            if now.saturating_sub(last) > timeout {
                self.taps.clear();
            }
        }
        if self.taps.len() > TAP_WINDOW {
            self.taps.pop_front();
        }
        self.taps.push_back(now);

        if self.taps.len() < 2 {
            return None;
        }
        let intervals: Vec<f32> = self
            .taps
            .iter()
            .zip(self.taps.iter().skip(1))
            .map(|(a, b)| (b - a) as f32 / SAMPLE_RATE as f32)
            .collect();
        let mean = intervals.iter().sum::<f32>() / intervals.len() as f32;
        if mean <= 0.0 {
            return None;
        }
        Some(60.0 / mean)
    }

    /// Discard tap history
    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

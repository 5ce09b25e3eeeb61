//! Spectral-flux onset detection
//!
//! Watches the bass-to-low-mid portion of the scaled spectrum (20–200 Hz).
//! Positive band-to-band differences between successive frames are summed
//! into a flux value, smoothed by a one-pole IIR, and compared against an
//! adaptive threshold derived from the recent flux statistics.

use std::collections::VecDeque;

use crate::dsp::ScaledSpectrum;
use crate::{SampleTime, SAMPLE_RATE};

/// Entries retained in the flux history (~23 s at the tick rate)
pub const ONSET_HISTORY_LEN: usize = 1024;

/// Upper edge of the flux sub-range in Hz
const FLUX_UPPER_HZ: f32 = 200.0;

/// One-pole smoothing weight of the newest flux sample
const FLUX_SMOOTHING: f32 = 0.2;

/// Statistics window for the adaptive threshold (~1 s)
const THRESHOLD_WINDOW: usize = 43;

/// Required exceedance over the local mean, in standard deviations
const THRESHOLD_SIGMA: f32 = 1.5;

/// Two onsets closer than this are one hit (200 ms ≙ 300 BPM ceiling)
const REFRACTORY_SAMPLES: SampleTime = SAMPLE_RATE as u64 / 5;

/// Onset detector over the low-frequency spectral flux
pub struct OnsetTracker {
    prev_bands: Vec<f32>,
    low_band_count: usize,
    smoothed_flux: f32,
    history: VecDeque<(SampleTime, f32)>,
    last_onset: Option<SampleTime>,
    primed: bool,
}

impl OnsetTracker {
    /// Create a tracker matched to the spectrum's band grid
    pub fn new(spectrum: &ScaledSpectrum) -> Self {
        let low_band_count = spectrum.band_for_freq(FLUX_UPPER_HZ) + 1;
        Self {
            prev_bands: vec![0.0; low_band_count],
            low_band_count,
            smoothed_flux: 0.0,
            history: VecDeque::with_capacity(ONSET_HISTORY_LEN),
            last_onset: None,
            primed: false,
        }
    }

    /// Process one spectrum frame; returns true when an onset is declared
    pub fn process(&mut self, spectrum: &ScaledSpectrum, now: SampleTime) -> bool {
        let bands = &spectrum.normalized()[..self.low_band_count];

        let mut flux = 0.0f32;
        for (b, &v) in bands.iter().enumerate() {
            flux += (v - self.prev_bands[b]).max(0.0);
            self.prev_bands[b] = v;
        }
        // The first frame has no predecessor; its "flux" is just energy.
        if !self.primed {
            self.primed = true;
            flux = 0.0;
        }

        self.smoothed_flux =
            FLUX_SMOOTHING * flux + (1.0 - FLUX_SMOOTHING) * self.smoothed_flux;

        if self.history.len() >= ONSET_HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back((now, self.smoothed_flux));

        self.detect(now)
    }

    /// Smoothed flux of the latest frame
    pub fn smoothed_flux(&self) -> f32 {
        self.smoothed_flux
    }

    /// The retained flux history, oldest first
    pub fn history(&self) -> impl Iterator<Item = (SampleTime, f32)> + '_ {
        self.history.iter().copied()
    }

    /// Reset all state (used when the audio source changes)
    pub fn reset(&mut self) {
        self.prev_bands.fill(0.0);
        self.smoothed_flux = 0.0;
        self.history.clear();
        self.last_onset = None;
        self.primed = false;
    }

    fn detect(&mut self, now: SampleTime) -> bool {
        if self.history.len() < THRESHOLD_WINDOW {
            return false;
        }
        if let Some(at) = self.last_onset {
            if now.saturating_sub(at) < REFRACTORY_SAMPLES {
                return false;
            }
        }

        // Mean and deviation over the trailing window, current sample excluded.
        let window = self
            .history
            .iter()
            .rev()
            .skip(1)
            .take(THRESHOLD_WINDOW)
            .map(|&(_, f)| f);
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for f in window.clone() {
            sum += f;
            count += 1;
        }
        let mean = sum / count as f32;
        let var = window.map(|f| (f - mean) * (f - mean)).sum::<f32>() / count as f32;
        let std = var.sqrt();

        let is_onset = self.smoothed_flux > mean + THRESHOLD_SIGMA * std && self.smoothed_flux > 1e-4;
        if is_onset {
            self.last_onset = Some(now);
        }
        is_onset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NUM_SAMPLES, SAMPLE_RATE};

    const TICK_SAMPLES: u64 = SAMPLE_RATE as u64 / 44;

    fn quiet_linear() -> Vec<f32> {
        vec![0.0; NUM_SAMPLES / 2]
    }

    fn kick_linear() -> Vec<f32> {
        let bins = NUM_SAMPLES / 2;
        let bin_width = SAMPLE_RATE as f32 / 2.0 / bins as f32;
        let mut linear = vec![0.0f32; bins];
        let idx = (60.0 / bin_width) as usize;
        for i in idx.saturating_sub(1)..=idx + 1 {
            linear[i] = 5.0;
        }
        linear
    }

    fn spectrum() -> ScaledSpectrum {
        let mut s = ScaledSpectrum::new(SAMPLE_RATE, NUM_SAMPLES / 2);
        s.set_agc_enabled(false);
        s
    }

    #[test]
    fn test_no_onset_in_silence() {
        let mut s = spectrum();
        s.update(&quiet_linear());
        let mut tracker = OnsetTracker::new(&s);
        for tick in 0..100 {
            s.update(&quiet_linear());
            assert!(!tracker.process(&s, tick * TICK_SAMPLES));
        }
    }

    #[test]
    fn test_kick_after_quiet_declares_onset() {
        let mut s = spectrum();
        let mut tracker = OnsetTracker::new(&s);

        // Establish quiet statistics.
        for tick in 0..60u64 {
            s.update(&quiet_linear());
            tracker.process(&s, tick * TICK_SAMPLES);
        }

        // Kick frame: flux jumps well past mean + 1.5 sigma.
        s.update(&kick_linear());
        let onset = tracker.process(&s, 60 * TICK_SAMPLES);
        assert!(onset, "flux spike must declare an onset");
    }

    #[test]
    fn test_refractory_suppresses_double_fire() {
        let mut s = spectrum();
        let mut tracker = OnsetTracker::new(&s);
        for tick in 0..60u64 {
            s.update(&quiet_linear());
            tracker.process(&s, tick * TICK_SAMPLES);
        }

        s.update(&kick_linear());
        assert!(tracker.process(&s, 60 * TICK_SAMPLES));

        // Sustained energy on the very next tick must not re-fire.
        s.update(&kick_linear());
        assert!(!tracker.process(&s, 61 * TICK_SAMPLES));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut s = spectrum();
        let mut tracker = OnsetTracker::new(&s);
        for tick in 0..(ONSET_HISTORY_LEN as u64 + 200) {
            s.update(&quiet_linear());
            tracker.process(&s, tick * TICK_SAMPLES);
        }
        assert_eq!(tracker.history().count(), ONSET_HISTORY_LEN);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut s = spectrum();
        let mut tracker = OnsetTracker::new(&s);
        s.update(&kick_linear());
        tracker.process(&s, 0);
        tracker.reset();
        assert_eq!(tracker.history().count(), 0);
        assert_eq!(tracker.smoothed_flux(), 0.0);
    }
}

//! Windowed real FFT of the analysis frame
//!
//! Fixed 4096-point transform over the newest ring window. All buffers and
//! the Hann window are allocated once at construction; `run` is
//! allocation-free.

use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::ring::SampleRing;
use crate::{SampleTime, NUM_SAMPLES};

/// FFT stage: ring snapshot → windowed transform → linear magnitudes
pub struct FftStage {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    frame: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    norm_factor: f32,
}

impl FftStage {
    /// Create the stage with its pre-planned transform
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(NUM_SAMPLES);
        let scratch_len = fft.get_inplace_scratch_len();

        // Hann window
        let window: Vec<f32> = (0..NUM_SAMPLES)
            .map(|i| {
                let t = i as f32 / (NUM_SAMPLES - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        Self {
            fft,
            window,
            frame: vec![0.0; NUM_SAMPLES],
            buffer: vec![Complex::new(0.0, 0.0); NUM_SAMPLES],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; NUM_SAMPLES / 2],
            norm_factor: 1.0 / (NUM_SAMPLES as f32).sqrt(),
        }
    }

    /// Analyse the newest frame in `ring`
    ///
    /// Returns the sample timestamp of the frame end.
    pub fn run(&mut self, ring: &SampleRing) -> SampleTime {
        let timestamp = ring.snapshot_last(&mut self.frame);

        for i in 0..NUM_SAMPLES {
            // NaN/Inf from a misbehaving source must not poison the spectrum.
            let sample = self.frame[i];
            let sample = if sample.is_finite() { sample } else { 0.0 };
            self.buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (i, magnitude) in self.magnitudes.iter_mut().enumerate() {
            *magnitude = self.buffer[i].norm() * self.norm_factor;
        }

        timestamp
    }

    /// Linear magnitude spectrum of the latest frame (N/2 bins)
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }
}

impl Default for FftStage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SAMPLE_RATE;

    fn sine_ring(freq: f32, amplitude: f32) -> SampleRing {
        let ring = SampleRing::new();
        let samples: Vec<f32> = (0..NUM_SAMPLES)
            .map(|i| {
                (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin()
                    * amplitude
            })
            .collect();
        ring.push(&samples);
        ring
    }

    #[test]
    fn test_sine_peak_lands_in_expected_bin() {
        // 430.66 Hz aligns with a bin centre at 44.1 kHz / 4096.
        let ring = sine_ring(430.66, 1.0);
        let mut stage = FftStage::new();
        stage.run(&ring);

        let mags = stage.magnitudes();
        let peak_bin = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();

        let expected = (430.66 * NUM_SAMPLES as f32 / SAMPLE_RATE as f32).round() as usize;
        assert!(
            peak_bin.abs_diff(expected) <= 1,
            "peak at bin {peak_bin}, expected ~{expected}"
        );
        assert!(mags[peak_bin] > 0.0);
    }

    #[test]
    fn test_silence_produces_zero_spectrum() {
        let ring = SampleRing::new();
        ring.push(&vec![0.0; NUM_SAMPLES]);
        let mut stage = FftStage::new();
        stage.run(&ring);
        assert!(stage.magnitudes().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_output_is_finite_for_bad_input() {
        let ring = SampleRing::new();
        let mut samples = vec![0.0f32; NUM_SAMPLES];
        samples[10] = f32::NAN;
        samples[11] = f32::INFINITY;
        samples[12] = f32::NEG_INFINITY;
        ring.push(&samples);

        let mut stage = FftStage::new();
        stage.run(&ring);
        assert!(stage.magnitudes().iter().all(|m| m.is_finite()));
    }

    #[test]
    fn test_run_returns_frame_timestamp() {
        let ring = SampleRing::new();
        ring.push(&vec![0.0; 5000]);
        let mut stage = FftStage::new();
        assert_eq!(stage.run(&ring), 5000);
    }
}

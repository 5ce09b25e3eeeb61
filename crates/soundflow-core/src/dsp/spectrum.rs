//! Perceptually scaled spectrum
//!
//! Maps the linear FFT magnitudes onto 200 logarithmically spaced bands
//! from 20 Hz to Nyquist and applies, in order: gain, the compression
//! exponent, optional decibel conversion, and AGC against a decaying peak
//! envelope. Every output stays inside [0, 1].

use crate::SPECTRUM_BANDS;

/// Lower edge of the band grid in Hz
pub const BASE_FREQ_HZ: f32 = 20.0;

/// AGC envelope decay per frame
const AGC_DECAY: f32 = 0.9995;

/// Division floor guarding AGC and other normalisations
const EPSILON: f32 = 1e-6;

/// Log-band spectrum with gain, compression, dB and AGC stages
pub struct ScaledSpectrum {
    bands: Box<[f32; SPECTRUM_BANDS]>,
    /// Fractional linear-bin positions of the 201 band edges
    edges: Vec<f32>,
    /// Log of the per-band frequency ratio
    ln_ratio: f32,
    gain: f32,
    compression: f32,
    agc_enabled: bool,
    decibel_mode: bool,
    agc_envelope: f32,
    linear_bins: usize,
    sample_rate: u32,
}

impl ScaledSpectrum {
    /// Create the spectrum for a given sample rate and linear bin count
    pub fn new(sample_rate: u32, linear_bins: usize) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let ratio = (nyquist / BASE_FREQ_HZ).powf(1.0 / SPECTRUM_BANDS as f32);
        let bin_width = nyquist / linear_bins as f32;

        let edges: Vec<f32> = (0..=SPECTRUM_BANDS)
            .map(|b| BASE_FREQ_HZ * ratio.powi(b as i32) / bin_width)
            .collect();

        Self {
            bands: Box::new([0.0; SPECTRUM_BANDS]),
            edges,
            ln_ratio: ratio.ln(),
            gain: 1.0,
            compression: 1.0,
            agc_enabled: true,
            decibel_mode: false,
            agc_envelope: 0.0,
            linear_bins,
            sample_rate,
        }
    }

    /// Fold a linear magnitude spectrum into the band grid and run the
    /// scaling pipeline
    pub fn update(&mut self, linear: &[f32]) {
        debug_assert_eq!(linear.len(), self.linear_bins);
        debug_assert!(linear.iter().all(|&m| m >= 0.0), "negative magnitude");

        for b in 0..SPECTRUM_BANDS {
            let lo = self.edges[b];
            let hi = self.edges[b + 1];

            let raw = if hi - lo < 1.0 {
                // Band narrower than one linear bin: interpolate at its centre.
                let pos = (0.5 * (lo + hi)).clamp(0.0, (self.linear_bins - 1) as f32);
                let i = (pos as usize).min(self.linear_bins - 2);
                let frac = pos - i as f32;
                linear[i] * (1.0 - frac) + linear[i + 1] * frac
            } else {
                let start = (lo as usize).min(self.linear_bins - 1);
                let end = (hi.ceil() as usize).clamp(start + 1, self.linear_bins);
                let sum: f32 = linear[start..end].iter().sum();
                sum / (end - start) as f32
            };

            let mut v = raw * self.gain;
            if self.compression != 1.0 {
                v = v.powf(self.compression);
            }
            v = if self.decibel_mode {
                if v <= 0.0 {
                    0.0
                } else {
                    ((20.0 * v.log10() + 60.0) / 60.0).clamp(0.0, 1.0)
                }
            } else {
                v.clamp(0.0, 1.0)
            };
            self.bands[b] = v;
        }

        if self.agc_enabled {
            let peak = self.bands.iter().copied().fold(0.0f32, f32::max);
            self.agc_envelope = peak.max(self.agc_envelope * AGC_DECAY);
            let div = self.agc_envelope.max(EPSILON);
            for v in self.bands.iter_mut() {
                *v = (*v / div).clamp(0.0, 1.0);
            }
        }
    }

    /// The current band vector, each value in [0, 1]
    pub fn normalized(&self) -> &[f32; SPECTRUM_BANDS] {
        &self.bands
    }

    /// Index of the band containing `freq` (clamped to the grid)
    pub fn band_for_freq(&self, freq: f32) -> usize {
        if freq <= BASE_FREQ_HZ {
            return 0;
        }
        let b = ((freq / BASE_FREQ_HZ).ln() / self.ln_ratio) as usize;
        b.min(SPECTRUM_BANDS - 1)
    }

    /// Maximum band value within `center_hz * (1 ± width)`, clamped to [0, 1]
    pub fn max_level_in(&self, center_hz: f32, width: f32) -> f32 {
        let lo = self.band_for_freq(center_hz * (1.0 - width));
        let hi = self.band_for_freq(center_hz * (1.0 + width));
        self.bands[lo..=hi]
            .iter()
            .copied()
            .fold(0.0f32, f32::max)
            .clamp(0.0, 1.0)
    }

    /// Plain average over all bands
    pub fn mean_level(&self) -> f32 {
        self.bands.iter().sum::<f32>() / SPECTRUM_BANDS as f32
    }

    /// Average weighted linearly by band index, low bands dominating
    pub fn weighted_mean_level(&self) -> f32 {
        let mut sum = 0.0f32;
        let mut weight_sum = 0.0f32;
        for (b, &v) in self.bands.iter().enumerate() {
            let w = (SPECTRUM_BANDS - b) as f32 / SPECTRUM_BANDS as f32;
            sum += v * w;
            weight_sum += w;
        }
        sum / weight_sum.max(EPSILON)
    }

    // -- Parameters --

    /// Linear gain applied before compression
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set the gain, clamped to [0, 64]
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 64.0);
    }

    /// Compression exponent
    pub fn compression(&self) -> f32 {
        self.compression
    }

    /// Set the compression exponent, clamped to [0.5, 2.0]
    pub fn set_compression(&mut self, compression: f32) {
        self.compression = compression.clamp(0.5, 2.0);
    }

    /// Whether AGC is active
    pub fn agc_enabled(&self) -> bool {
        self.agc_enabled
    }

    /// Enable or disable AGC; disabling freezes the envelope
    pub fn set_agc_enabled(&mut self, enabled: bool) {
        self.agc_enabled = enabled;
    }

    /// Whether dB conversion is active
    pub fn decibel_mode(&self) -> bool {
        self.decibel_mode
    }

    /// Enable or disable dB conversion
    pub fn set_decibel_mode(&mut self, enabled: bool) {
        self.decibel_mode = enabled;
    }

    /// Current AGC envelope value
    pub fn agc_envelope(&self) -> f32 {
        self.agc_envelope
    }

    /// Sample rate the grid was built for
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

//! Trigger detectors
//!
//! Six detectors run each spectrum tick in a fixed order: four band-pass
//! detectors (bass, loMid, hiMid, high), one broad-band envelope detector
//! and one silence detector. Each computes a level in [0, 1] from the
//! scaled spectrum, compares it against its threshold (level ≥ threshold is
//! "on") and drives its [`TriggerFilter`].

pub mod filter;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;

use crate::dsp::ScaledSpectrum;
use crate::{OscSink, SampleTime};

pub use filter::{FilterState, OscBinding, TriggerFilter, LEVEL_MESSAGE_INTERVAL};

/// Band-pass detectors at or above this frequency release in low-solo mode
pub const LOW_SOLO_LIMIT_HZ: f32 = 1000.0;

/// The fixed trigger roster, in processing and emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerName {
    /// Band-pass at 80 Hz
    Bass,
    /// Band-pass at 400 Hz
    LoMid,
    /// Band-pass at 1 kHz
    HiMid,
    /// Band-pass at 5 kHz
    High,
    /// Broad-band loudness
    Envelope,
    /// Absence of energy
    Silence,
}

impl TriggerName {
    /// All triggers in processing order
    pub const ALL: [TriggerName; 6] = [
        TriggerName::Bass,
        TriggerName::LoMid,
        TriggerName::HiMid,
        TriggerName::High,
        TriggerName::Envelope,
        TriggerName::Silence,
    ];

    /// Identifier used in presets and control addresses
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerName::Bass => "bass",
            TriggerName::LoMid => "loMid",
            TriggerName::HiMid => "hiMid",
            TriggerName::High => "high",
            TriggerName::Envelope => "envelope",
            TriggerName::Silence => "silence",
        }
    }

    /// Parse an identifier
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == s)
    }
}

/// How a detector derives its level from the spectrum
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerKind {
    /// Maximum band level around a centre frequency
    BandPass {
        /// Centre frequency in Hz
        center_hz: f32,
        /// Fractional log-width of the pass band
        width: f32,
    },
    /// Index-weighted mean over all bands (low bands dominate)
    Envelope,
    /// Inverse of the plain band mean; fires on quiet
    Silence,
}

impl TriggerKind {
    /// Compute the detector level in [0, 1]
    pub fn level(&self, spectrum: &ScaledSpectrum) -> f32 {
        match self {
            TriggerKind::BandPass { center_hz, width } => {
                spectrum.max_level_in(*center_hz, *width)
            }
            TriggerKind::Envelope => spectrum.weighted_mean_level().clamp(0.0, 1.0),
            TriggerKind::Silence => (1.0 - spectrum.mean_level()).clamp(0.0, 1.0),
        }
    }

    /// Whether low-solo mode forces this detector to release
    pub fn released_by_low_solo(&self) -> bool {
        matches!(self, TriggerKind::BandPass { center_hz, .. } if *center_hz >= LOW_SOLO_LIMIT_HZ)
    }
}

/// Lock-free view of a trigger for host UIs
///
/// Updated every tick by the processing context; muting does not stop the
/// updates.
#[derive(Debug, Default)]
pub struct TriggerShared {
    level: AtomicF32,
    active: AtomicBool,
}

impl TriggerShared {
    /// Detector level of the latest tick
    pub fn level(&self) -> f32 {
        self.level.load(Ordering::Relaxed)
    }

    /// Whether the trigger output is on
    pub fn active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// One detector with its timing filter
pub struct TriggerGenerator {
    name: TriggerName,
    kind: TriggerKind,
    threshold: f32,
    filter: TriggerFilter,
    shared: Arc<TriggerShared>,
}

impl TriggerGenerator {
    /// Create a band-pass detector with the default width and threshold
    pub fn band_pass(name: TriggerName, center_hz: f32) -> Self {
        Self::new(
            name,
            TriggerKind::BandPass {
                center_hz,
                width: 0.1,
            },
            0.5,
        )
    }

    /// Create the envelope detector
    pub fn envelope(name: TriggerName) -> Self {
        Self::new(name, TriggerKind::Envelope, 0.5)
    }

    /// Create the silence detector
    pub fn silence(name: TriggerName) -> Self {
        Self::new(name, TriggerKind::Silence, 0.2)
    }

    fn new(name: TriggerName, kind: TriggerKind, threshold: f32) -> Self {
        Self {
            name,
            kind,
            threshold,
            filter: TriggerFilter::new(OscBinding::new()),
            shared: Arc::new(TriggerShared::default()),
        }
    }

    /// Run one detector tick against the current spectrum
    ///
    /// Returns whether the detector asserted.
    pub fn check(
        &mut self,
        spectrum: &ScaledSpectrum,
        low_solo: bool,
        now: SampleTime,
        sink: &mut dyn OscSink,
    ) -> bool {
        // Expire max-hold first so a still-asserting detector re-enters
        // within this same tick.
        self.filter.begin_tick(now, sink);

        let forced = low_solo && self.kind.released_by_low_solo();
        let level = if forced { 0.0 } else { self.kind.level(spectrum) };
        let asserted = !forced && level >= self.threshold;

        self.filter.process(level, asserted, now, sink);

        self.shared.level.store(level, Ordering::Relaxed);
        self.shared
            .active
            .store(self.filter.is_active(), Ordering::Relaxed);

        asserted
    }

    /// Trigger identifier
    pub fn name(&self) -> TriggerName {
        self.name
    }

    /// Detector kind
    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    /// Detection threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Set the threshold, clamped to [0, 1]
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.0, 1.0);
    }

    /// Band-pass centre frequency, if applicable
    pub fn center_hz(&self) -> Option<f32> {
        match &self.kind {
            TriggerKind::BandPass { center_hz, .. } => Some(*center_hz),
            _ => None,
        }
    }

    /// Set the band-pass centre frequency (no-op for other kinds)
    pub fn set_center_hz(&mut self, hz: f32) {
        if let TriggerKind::BandPass { center_hz, .. } = &mut self.kind {
            *center_hz = hz.max(crate::dsp::BASE_FREQ_HZ);
        }
    }

    /// Band-pass width, if applicable
    pub fn width(&self) -> Option<f32> {
        match &self.kind {
            TriggerKind::BandPass { width, .. } => Some(*width),
            _ => None,
        }
    }

    /// Set the band-pass width, clamped to [0, 1] (no-op for other kinds)
    pub fn set_width(&mut self, value: f32) {
        if let TriggerKind::BandPass { width, .. } = &mut self.kind {
            *width = value.clamp(0.0, 1.0);
        }
    }

    /// The timing filter
    pub fn filter(&self) -> &TriggerFilter {
        &self.filter
    }

    /// Mutable timing filter
    pub fn filter_mut(&mut self) -> &mut TriggerFilter {
        &mut self.filter
    }

    /// Shareable host view
    pub fn shared(&self) -> Arc<TriggerShared> {
        Arc::clone(&self.shared)
    }

    /// Level of the latest tick
    pub fn current_level(&self) -> f32 {
        self.shared.level()
    }

    /// Whether the trigger output is on
    pub fn is_active(&self) -> bool {
        self.filter.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NUM_SAMPLES, SAMPLE_RATE};
    use soundflow_control::OscMessage;

    fn spectrum_with_peak(freq: f32) -> ScaledSpectrum {
        let bins = NUM_SAMPLES / 2;
        let bin_width = SAMPLE_RATE as f32 / 2.0 / bins as f32;
        let mut linear = vec![0.0f32; bins];
        let idx = ((freq / bin_width) as usize).min(bins - 1);
        // Several adjacent hot bins so band averaging still sees a strong level
        for i in idx.saturating_sub(2)..(idx + 3).min(bins) {
            linear[i] = 10.0;
        }
        let mut s = ScaledSpectrum::new(SAMPLE_RATE, bins);
        s.set_agc_enabled(false);
        s.update(&linear);
        s
    }

    fn silent_spectrum() -> ScaledSpectrum {
        let mut s = ScaledSpectrum::new(SAMPLE_RATE, NUM_SAMPLES / 2);
        s.set_agc_enabled(false);
        s.update(&vec![0.0; NUM_SAMPLES / 2]);
        s
    }

    #[test]
    fn test_band_pass_fires_in_band_only() {
        let mut sink: Vec<OscMessage> = Vec::new();
        let mut bass = TriggerGenerator::band_pass(TriggerName::Bass, 80.0);
        bass.set_threshold(0.3);

        assert!(bass.check(&spectrum_with_peak(80.0), false, 0, &mut sink));
        assert!(bass.is_active());

        let mut bass2 = TriggerGenerator::band_pass(TriggerName::Bass, 80.0);
        bass2.set_threshold(0.3);
        assert!(!bass2.check(&spectrum_with_peak(5000.0), false, 0, &mut sink));
        assert!(!bass2.is_active());
    }

    #[test]
    fn test_silence_detector_inverts() {
        let mut sink: Vec<OscMessage> = Vec::new();
        let mut silence = TriggerGenerator::silence(TriggerName::Silence);

        assert!(silence.check(&silent_spectrum(), false, 0, &mut sink));

        // Loud broad-band signal suppresses it.
        let mut loud = ScaledSpectrum::new(SAMPLE_RATE, NUM_SAMPLES / 2);
        loud.set_agc_enabled(false);
        loud.set_gain(64.0);
        loud.update(&vec![1.0; NUM_SAMPLES / 2]);
        let mut silence2 = TriggerGenerator::silence(TriggerName::Silence);
        assert!(!silence2.check(&loud, false, 0, &mut sink));
    }

    #[test]
    fn test_threshold_extremes() {
        let mut sink: Vec<OscMessage> = Vec::new();
        let spectrum = spectrum_with_peak(400.0);

        // Threshold 0: any non-zero level asserts.
        let mut lo_mid = TriggerGenerator::band_pass(TriggerName::LoMid, 400.0);
        lo_mid.set_threshold(0.0);
        assert!(lo_mid.check(&spectrum, false, 0, &mut sink));

        // Threshold 1 with AGC off and bounded input: stays idle.
        let mut strict = TriggerGenerator::band_pass(TriggerName::LoMid, 400.0);
        strict.set_threshold(1.0);
        let mut weak = ScaledSpectrum::new(SAMPLE_RATE, NUM_SAMPLES / 2);
        weak.set_agc_enabled(false);
        weak.set_gain(0.1);
        weak.update(&vec![0.01; NUM_SAMPLES / 2]);
        assert!(!strict.check(&weak, false, 0, &mut sink));
        assert!(!strict.is_active());
    }

    #[test]
    fn test_level_equal_to_threshold_is_on() {
        let mut sink: Vec<OscMessage> = Vec::new();
        let mut trigger = TriggerGenerator::silence(TriggerName::Silence);
        // Silence level on a silent spectrum is exactly 1.0.
        trigger.set_threshold(1.0);
        assert!(trigger.check(&silent_spectrum(), false, 0, &mut sink));
    }

    #[test]
    fn test_low_solo_releases_high_bands_only() {
        let mut sink: Vec<OscMessage> = Vec::new();
        let spectrum = spectrum_with_peak(5000.0);

        let mut high = TriggerGenerator::band_pass(TriggerName::High, 5000.0);
        high.set_threshold(0.1);
        assert!(high.check(&spectrum, false, 0, &mut sink));
        assert!(high.is_active());

        // Low-solo releases it even though the band is hot.
        assert!(!high.check(&spectrum, true, 1000, &mut sink));
        assert!(!high.is_active());
        assert_eq!(high.current_level(), 0.0);

        // Bass detector is unaffected by low-solo.
        let bass_spectrum = spectrum_with_peak(80.0);
        let mut bass = TriggerGenerator::band_pass(TriggerName::Bass, 80.0);
        bass.set_threshold(0.1);
        assert!(bass.check(&bass_spectrum, true, 0, &mut sink));
    }

    #[test]
    fn test_hi_mid_at_exactly_1khz_is_soloed_out() {
        let kind = TriggerKind::BandPass {
            center_hz: 1000.0,
            width: 0.1,
        };
        assert!(kind.released_by_low_solo());
        let kind = TriggerKind::BandPass {
            center_hz: 400.0,
            width: 0.1,
        };
        assert!(!kind.released_by_low_solo());
    }

    #[test]
    fn test_trigger_name_roundtrip() {
        for name in TriggerName::ALL {
            assert_eq!(TriggerName::parse(name.as_str()), Some(name));
        }
        assert_eq!(TriggerName::parse("kick"), None);
    }
}

//! SoundFlow Core - Audio analysis to OSC event engine
//!
//! This crate contains the whole processing pipeline:
//! - [`ring`] - lock-free SPSC sample ring fed by the audio callback
//! - [`dsp`] - windowed FFT and the 200-band scaled spectrum
//! - [`trigger`] - six threshold detectors with delay/hold filtering
//! - [`bpm`] - spectral-flux onsets, tempo estimation, tap tempo
//! - [`preset`] - versioned JSON state with unknown-key preservation
//! - [`engine`] - the 44 Hz tick orchestrator owning all of the above
//!
//! Audio capture and the log subscriber live in the host; see the
//! `soundflow` binary crate.

#![warn(missing_docs)]

pub mod audio;
pub mod bpm;
pub mod diag;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod logging;
pub mod preset;
pub mod ring;
pub mod trigger;

use soundflow_control::{OscMessage, OscSender};

pub use audio::{AudioSource, MonoMixer, SampleCallback};
pub use bpm::{BeatEstimate, BpmOscController, OnsetTracker, TapTempo, TempoEstimator};
pub use diag::{DiagnosticCode, DiagnosticEvent, DiagnosticHub, DiagnosticLevel};
pub use dsp::{FftStage, ScaledSpectrum};
pub use engine::{Engine, EngineConfig};
pub use error::{CoreError, Result};
pub use logging::LogConfig;
pub use preset::{PresetDocument, PRESET_FORMAT_VERSION};
pub use ring::SampleRing;
pub use trigger::{
    FilterState, OscBinding, TriggerFilter, TriggerGenerator, TriggerKind, TriggerName,
};

/// Sample index on the engine's 44.1 kHz timeline
pub type SampleTime = u64;

/// The sample rate the analysis chain assumes
pub const SAMPLE_RATE: u32 = 44_100;

/// Nominal processing rate in ticks per second
pub const TICK_RATE: u32 = 44;

/// FFT frame length in samples
pub const NUM_SAMPLES: usize = 4096;

/// Bands in the scaled spectrum
pub const SPECTRUM_BANDS: usize = 200;

/// Destination for generated OSC messages
///
/// The engine components write into whatever sink they are handed: the
/// real send queue in production, a plain `Vec` in tests.
pub trait OscSink {
    /// Queue one message
    fn push(&mut self, msg: OscMessage);
}

impl OscSink for OscSender {
    fn push(&mut self, msg: OscMessage) {
        self.enqueue(msg);
    }
}

impl OscSink for Vec<OscMessage> {
    fn push(&mut self, msg: OscMessage) {
        Vec::push(self, msg);
    }
}

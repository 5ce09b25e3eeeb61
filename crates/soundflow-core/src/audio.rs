//! Audio input abstraction
//!
//! The engine never talks to platform audio itself; a host supplies an
//! [`AudioSource`] and wires its callback to a [`MonoMixer`], which folds
//! interleaved channels down to mono and feeds the sample ring. The mixer
//! is safe to drive from a real-time callback: no locks, no allocation
//! after construction.

use std::sync::Arc;

use crate::error::Result;
use crate::ring::SampleRing;

/// The sample rate the analysis chain is built for
pub const EXPECTED_SAMPLE_RATE: u32 = crate::SAMPLE_RATE;

/// Callback handed to an audio source; receives interleaved samples
pub type SampleCallback = Box<dyn FnMut(&[f32], u16) + Send + 'static>;

/// Capability interface of a capture backend
///
/// Implementations live outside the engine (the bundled binary provides a
/// cpal-backed one). All methods are called from the host context, never
/// from the audio callback. The registered callback runs on the backend's
/// real-time thread and must be `Send`; the source itself stays on the
/// thread that owns the engine.
pub trait AudioSource {
    /// Begin capturing; the callback starts receiving samples
    fn start(&mut self) -> Result<()>;

    /// Stop capturing
    fn stop(&mut self);

    /// Names of the available input devices
    fn list_devices(&self) -> Vec<String>;

    /// Select an input device by name
    fn select(&mut self, name: &str) -> Result<()>;

    /// Input volume scale in [0, 1]
    fn volume(&self) -> f32;

    /// Set the input volume scale
    fn set_volume(&mut self, volume: f32);

    /// Name of the active device, if any
    fn active_name(&self) -> Option<String>;

    /// Sample rate the device delivers
    fn sample_rate(&self) -> u32;

    /// Register the sample callback; must be called before `start`
    fn set_callback(&mut self, callback: SampleCallback);
}

/// Interleaved-to-mono downmixer feeding the sample ring
pub struct MonoMixer {
    ring: Arc<SampleRing>,
    scratch: Vec<f32>,
}

/// Scratch chunk size in frames; bounds per-flush latency
const MIX_CHUNK: usize = 2048;

impl MonoMixer {
    /// Create a mixer writing into `ring`
    pub fn new(ring: Arc<SampleRing>) -> Self {
        Self {
            ring,
            scratch: vec![0.0; MIX_CHUNK],
        }
    }

    /// Mix interleaved samples down to mono and push them to the ring
    ///
    /// Channels are averaged. `channels == 0` is treated as mono.
    pub fn push_interleaved(&mut self, samples: &[f32], channels: u16) {
        let channels = channels.max(1) as usize;
        if channels == 1 {
            self.ring.push(samples);
            return;
        }

        let mut filled = 0usize;
        for frame in samples.chunks_exact(channels) {
            let sum: f32 = frame.iter().sum();
            self.scratch[filled] = sum / channels as f32;
            filled += 1;
            if filled == MIX_CHUNK {
                self.ring.push(&self.scratch);
                filled = 0;
            }
        }
        if filled > 0 {
            self.ring.push(&self.scratch[..filled]);
        }
    }

    /// Build the boxed callback for [`AudioSource::set_callback`]
    pub fn into_callback(mut self) -> SampleCallback {
        Box::new(move |samples, channels| self.push_interleaved(samples, channels))
    }
}

//! cpal-backed audio capture source
//!
//! Opens the system's default (or a named) input device and forwards
//! interleaved f32 samples to the engine's callback. Integer formats are
//! converted in the callback; the input volume scale is applied there too.

use std::sync::{Arc, Mutex};

use atomic_float::AtomicF32;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use soundflow_core::{AudioSource, CoreError, SampleCallback};

type SharedCallback = Arc<Mutex<Option<SampleCallback>>>;

/// Audio input via the platform's cpal host
pub struct CpalSource {
    host: cpal::Host,
    device: Option<cpal::Device>,
    stream: Option<Stream>,
    callback: SharedCallback,
    volume: Arc<AtomicF32>,
    sample_rate: u32,
    channels: u16,
}

impl CpalSource {
    /// Create a source bound to the default input device, if any
    pub fn new() -> Self {
        let host = cpal::default_host();
        let device = host.default_input_device();
        let mut source = Self {
            host,
            device,
            stream: None,
            callback: Arc::new(Mutex::new(None)),
            volume: Arc::new(AtomicF32::new(1.0)),
            sample_rate: 0,
            channels: 0,
        };
        source.probe_format();
        source
    }

    fn probe_format(&mut self) {
        if let Some(device) = &self.device {
            if let Ok(config) = device.default_input_config() {
                self.sample_rate = config.sample_rate().0;
                self.channels = config.channels();
            }
        }
    }

    fn build_stream(&mut self) -> soundflow_core::Result<Stream> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| CoreError::AudioUnavailable("no input device".into()))?;
        let default_config = device
            .default_input_config()
            .map_err(|e| CoreError::AudioUnavailable(format!("input config: {e}")))?;

        let sample_format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        self.sample_rate = config.sample_rate.0;
        self.channels = config.channels;
        let channels = config.channels;

        let callback = Arc::clone(&self.callback);
        let volume = Arc::clone(&self.volume);
        let err_fn = |e| tracing::warn!("audio stream error: {e}");

        // Conversion scratch lives in the closure; sized on first use and
        // reused afterwards.
        let stream = match sample_format {
            SampleFormat::F32 => {
                let mut scaled: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let gain = volume.load(std::sync::atomic::Ordering::Relaxed);
                        scaled.clear();
                        scaled.extend(data.iter().map(|&s| s * gain));
                        deliver(&callback, &scaled, channels);
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let mut scaled: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let gain = volume.load(std::sync::atomic::Ordering::Relaxed);
                        scaled.clear();
                        scaled.extend(data.iter().map(|&s| s as f32 / 32_768.0 * gain));
                        deliver(&callback, &scaled, channels);
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let mut scaled: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        let gain = volume.load(std::sync::atomic::Ordering::Relaxed);
                        scaled.clear();
                        scaled.extend(
                            data.iter()
                                .map(|&s| (s as f32 - 32_768.0) / 32_768.0 * gain),
                        );
                        deliver(&callback, &scaled, channels);
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(CoreError::AudioUnavailable(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        };

        stream.map_err(|e| CoreError::AudioUnavailable(format!("build input stream: {e}")))
    }
}

/// Hand a converted buffer to the engine callback
///
/// `try_lock` keeps the audio thread from ever blocking; the lock is only
/// contended for the instant the callback is being (re)registered.
fn deliver(callback: &SharedCallback, samples: &[f32], channels: u16) {
    if let Ok(mut guard) = callback.try_lock() {
        if let Some(cb) = guard.as_mut() {
            cb(samples, channels);
        }
    }
}

impl AudioSource for CpalSource {
    fn start(&mut self) -> soundflow_core::Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| CoreError::AudioUnavailable(format!("stream play: {e}")))?;
        tracing::info!(
            "Audio capture started: {} ({} Hz, {} ch)",
            self.active_name().unwrap_or_else(|| "?".into()),
            self.sample_rate,
            self.channels
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        self.stream = None;
    }

    fn list_devices(&self) -> Vec<String> {
        match self.host.input_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                tracing::warn!("device enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    fn select(&mut self, name: &str) -> soundflow_core::Result<()> {
        let device = self
            .host
            .input_devices()
            .map_err(|e| CoreError::AudioUnavailable(format!("device enumeration: {e}")))?
            .find(|d| d.name().map_or(false, |n| n == name))
            .ok_or_else(|| CoreError::AudioUnavailable(format!("no input named '{name}'")))?;

        let was_running = self.stream.is_some();
        self.stream = None;
        self.device = Some(device);
        self.probe_format();
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    fn volume(&self) -> f32 {
        self.volume.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0), std::sync::atomic::Ordering::Relaxed);
    }

    fn active_name(&self) -> Option<String> {
        if self.stream.is_none() {
            return None;
        }
        self.device.as_ref().and_then(|d| d.name().ok())
    }

    fn sample_rate(&self) -> u32 {
        if self.sample_rate == 0 {
            soundflow_core::SAMPLE_RATE
        } else {
            self.sample_rate
        }
    }

    fn set_callback(&mut self, callback: SampleCallback) {
        *self.callback.lock().expect("callback mutex poisoned") = Some(callback);
    }
}

//! The processing engine
//!
//! Owns every analysis component and drives them at the 44 Hz tick:
//! SpectrumTick (FFT → scaled spectrum → six triggers) followed by
//! BeatTick (onset tracking → tempo estimation → BPM output), then the
//! incoming control poll and the outgoing flush. All engine state mutation
//! happens between ticks; the audio callback only ever touches the ring.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use serde_json::Value;

use soundflow_control::osc::packet;
use soundflow_control::{parse_control, ControlCommand, MessageTemplate, OscProtocol, OscSender, UdpReceiver};

use crate::audio::{AudioSource, MonoMixer, EXPECTED_SAMPLE_RATE};
use crate::bpm::{BpmOscController, OnsetTracker, TapTempo, TempoEstimator};
use crate::diag::{DiagnosticCode, DiagnosticEvent, DiagnosticHub, DiagnosticLevel};
use crate::dsp::{FftStage, ScaledSpectrum};
use crate::error::{CoreError, Result};
use crate::preset::{PresetDocument, PRESET_FORMAT_VERSION};
use crate::ring::SampleRing;
use crate::trigger::{TriggerGenerator, TriggerName, TriggerShared};
use crate::{SampleTime, NUM_SAMPLES, SAMPLE_RATE, TICK_RATE};

/// Samples of engine time per tick
const SAMPLES_PER_TICK: u64 = (SAMPLE_RATE as u64) / (TICK_RATE as u64);

/// Spacing of periodic status diagnostics
const STATUS_INTERVAL: SampleTime = 5 * SAMPLE_RATE as u64;

/// Spacing of throttled decode/transport diagnostics
const DECODE_REPORT_INTERVAL: SampleTime = SAMPLE_RATE as u64;

/// Wall-clock spacing of audio reselection attempts
const AUDIO_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Cap on draining in-flight OSC messages during shutdown
const SHUTDOWN_DRAIN_CAP: Duration = Duration::from_millis(500);

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// OSC destination
    pub osc_target: SocketAddr,
    /// Outgoing protocol
    pub protocol: OscProtocol,
    /// Port for incoming control messages; `None` disables the receiver
    pub osc_rx_port: Option<u16>,
    /// Directory preset names from remote `preset/load` resolve against
    pub preset_dir: Option<PathBuf>,
    /// Diagnostics channel capacity
    pub diagnostics_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            osc_target: "127.0.0.1:9000".parse().expect("static address"),
            protocol: OscProtocol::Udp,
            osc_rx_port: None,
            preset_dir: None,
            diagnostics_capacity: 64,
        }
    }
}

/// The audio-to-OSC processing engine
pub struct Engine {
    config: EngineConfig,
    ring: Arc<SampleRing>,
    fft: FftStage,
    spectrum: ScaledSpectrum,
    triggers: Vec<TriggerGenerator>,
    onset: OnsetTracker,
    tempo: TempoEstimator,
    bpm_osc: BpmOscController,
    tap: TapTempo,
    manual_bpm: Option<f32>,
    sender: OscSender,
    receiver: Option<UdpReceiver>,
    diag: DiagnosticHub,
    audio: Option<Box<dyn AudioSource>>,
    audio_retry_at: Instant,
    low_solo: bool,
    ticks: u64,
    overruns: u64,
    decode_errors: u64,
    last_decode_report: SampleTime,
    send_failures: u64,
    last_send_report: SampleTime,
    last_status: SampleTime,
    preset_base: PresetDocument,
    shut_down: bool,
}

impl Engine {
    /// Build the engine; returns it with the host's diagnostics receiver
    pub fn new(config: EngineConfig) -> Result<(Self, Receiver<DiagnosticEvent>)> {
        tracing::info!(
            "Initializing engine: OSC -> {} ({:?})",
            config.osc_target,
            config.protocol
        );

        let spectrum = ScaledSpectrum::new(SAMPLE_RATE, NUM_SAMPLES / 2);
        let onset = OnsetTracker::new(&spectrum);
        let sender = OscSender::new(config.osc_target, config.protocol)?;
        let receiver = match config.osc_rx_port {
            Some(port) => Some(UdpReceiver::bind(port)?),
            None => None,
        };
        let (diag, diag_rx) = DiagnosticHub::new(config.diagnostics_capacity);

        let triggers = vec![
            TriggerGenerator::band_pass(TriggerName::Bass, 80.0),
            TriggerGenerator::band_pass(TriggerName::LoMid, 400.0),
            TriggerGenerator::band_pass(TriggerName::HiMid, 1000.0),
            TriggerGenerator::band_pass(TriggerName::High, 5000.0),
            TriggerGenerator::envelope(TriggerName::Envelope),
            TriggerGenerator::silence(TriggerName::Silence),
        ];

        let engine = Self {
            config,
            ring: Arc::new(SampleRing::new()),
            fft: FftStage::new(),
            spectrum,
            triggers,
            onset,
            tempo: TempoEstimator::new(),
            bpm_osc: BpmOscController::new(),
            tap: TapTempo::new(),
            manual_bpm: None,
            sender,
            receiver,
            diag,
            audio: None,
            audio_retry_at: Instant::now(),
            low_solo: false,
            ticks: 0,
            overruns: 0,
            decode_errors: 0,
            last_decode_report: 0,
            send_failures: 0,
            last_send_report: 0,
            last_status: 0,
            preset_base: PresetDocument::new(),
            shut_down: false,
        };
        Ok((engine, diag_rx))
    }

    // -- Wiring --

    /// The shared sample ring (for custom audio wiring)
    pub fn ring(&self) -> Arc<SampleRing> {
        Arc::clone(&self.ring)
    }

    /// A mixer whose output feeds this engine
    pub fn create_mixer(&self) -> MonoMixer {
        MonoMixer::new(self.ring())
    }

    /// Attach and start an audio source
    ///
    /// A wrong sample rate is reported and tolerated; a failed start puts
    /// the engine into zero-input mode with periodic retries.
    pub fn set_audio_source(&mut self, mut source: Box<dyn AudioSource>) {
        if source.sample_rate() != EXPECTED_SAMPLE_RATE {
            self.diag.emit(
                DiagnosticLevel::Warning,
                DiagnosticCode::AudioUnavailable,
                format!(
                    "audio source delivers {} Hz, analysis assumes {} Hz",
                    source.sample_rate(),
                    EXPECTED_SAMPLE_RATE
                ),
                self.now(),
            );
        }
        source.set_callback(self.create_mixer().into_callback());
        if let Err(e) = source.start() {
            self.diag.emit(
                DiagnosticLevel::Warning,
                DiagnosticCode::AudioUnavailable,
                format!("audio start failed, running silent: {e}"),
                self.now(),
            );
        }
        self.audio = Some(source);
        self.audio_retry_at = Instant::now() + AUDIO_RETRY_INTERVAL;
    }

    /// The attached audio source, if any
    pub fn audio_source(&self) -> Option<&dyn AudioSource> {
        self.audio.as_deref()
    }

    // -- Accessors --

    /// Current engine sample time
    pub fn now(&self) -> SampleTime {
        self.ticks * SAMPLES_PER_TICK
    }

    /// Ticks processed so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks skipped due to deadline misses
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Whether low-solo mode is active
    pub fn low_solo_mode(&self) -> bool {
        self.low_solo
    }

    /// Force band-pass triggers at or above 1 kHz to release
    pub fn set_low_solo_mode(&mut self, enabled: bool) {
        self.low_solo = enabled;
    }

    /// The scaled spectrum (gain, compression, AGC, dB mode)
    pub fn spectrum(&self) -> &ScaledSpectrum {
        &self.spectrum
    }

    /// Mutable scaled spectrum
    pub fn spectrum_mut(&mut self) -> &mut ScaledSpectrum {
        &mut self.spectrum
    }

    /// Trigger by name
    pub fn trigger(&self, name: TriggerName) -> &TriggerGenerator {
        self.triggers
            .iter()
            .find(|t| t.name() == name)
            .expect("all six triggers exist")
    }

    /// Mutable trigger by name
    pub fn trigger_mut(&mut self, name: TriggerName) -> &mut TriggerGenerator {
        self.triggers
            .iter_mut()
            .find(|t| t.name() == name)
            .expect("all six triggers exist")
    }

    /// Shared host views of all triggers, in processing order
    pub fn trigger_shares(&self) -> Vec<(TriggerName, Arc<TriggerShared>)> {
        self.triggers
            .iter()
            .map(|t| (t.name(), t.shared()))
            .collect()
    }

    /// The tempo estimator
    pub fn tempo(&self) -> &TempoEstimator {
        &self.tempo
    }

    /// Mutable tempo estimator
    pub fn tempo_mut(&mut self) -> &mut TempoEstimator {
        &mut self.tempo
    }

    /// The BPM OSC controller
    pub fn bpm_osc(&self) -> &BpmOscController {
        &self.bpm_osc
    }

    /// Mutable BPM OSC controller
    pub fn bpm_osc_mut(&mut self) -> &mut BpmOscController {
        &mut self.bpm_osc
    }

    /// The outgoing OSC sender
    pub fn osc(&self) -> &OscSender {
        &self.sender
    }

    /// Mutable outgoing OSC sender
    pub fn osc_mut(&mut self) -> &mut OscSender {
        &mut self.sender
    }

    // -- Processing --

    /// Run one full processing period (SpectrumTick, then BeatTick)
    ///
    /// Deterministic: tests drive this directly with injected ring data.
    pub fn tick(&mut self) {
        let now = self.now();
        self.spectrum_tick(now);
        self.beat_tick(now);
        self.pump_incoming(now);
        self.report_transport(now);
        let flushed = self.sender.flush_tick();
        self.send_failures += flushed.failed as u64;
        self.ticks += 1;
        self.maybe_status(now);
    }

    fn spectrum_tick(&mut self, now: SampleTime) {
        self.fft.run(&self.ring);
        self.spectrum.update(self.fft.magnitudes());
        for trigger in &mut self.triggers {
            trigger.check(&self.spectrum, self.low_solo, now, &mut self.sender);
        }
    }

    fn beat_tick(&mut self, now: SampleTime) {
        let onset = self.onset.process(&self.spectrum, now);
        if onset {
            self.tempo.on_onset(now);
        }
        self.tempo.refresh(now);
        let estimate = self.tempo.estimate();

        if onset {
            self.bpm_osc.on_beat(estimate.stale, &mut self.sender);
        }

        // A manual tap overrides the auto estimate until the estimator
        // locks again with solid support.
        if self.manual_bpm.is_some()
            && estimate.bpm.is_some()
            && !estimate.stale
            && estimate.confidence >= 0.5
        {
            self.manual_bpm = None;
        }
        if let Some(manual) = self.manual_bpm {
            self.bpm_osc.on_bpm(manual, false, &mut self.sender);
        } else if let Some(bpm) = estimate.bpm {
            self.bpm_osc.on_bpm(bpm, estimate.stale, &mut self.sender);
        }
    }

    fn pump_incoming(&mut self, now: SampleTime) {
        let raws = match self.receiver.as_mut() {
            Some(receiver) => receiver.poll(),
            None => return,
        };
        let mut commands = Vec::new();
        for raw in raws {
            match packet::decode(&raw) {
                Ok(pkt) => {
                    for msg in pkt.into_messages() {
                        self.sender.log_received(&msg);
                        if let Some(cmd) = parse_control(&msg) {
                            commands.push(cmd);
                        }
                    }
                }
                Err(e) => {
                    self.decode_errors += 1;
                    tracing::debug!("dropping malformed OSC packet: {e}");
                }
            }
        }
        for cmd in commands {
            self.apply_control(cmd, now);
        }
    }

    fn apply_control(&mut self, cmd: ControlCommand, now: SampleTime) {
        match cmd {
            ControlCommand::SetTriggerThreshold { trigger, value } => {
                match TriggerName::parse(&trigger) {
                    Some(name) => self.trigger_mut(name).set_threshold(value),
                    None => tracing::debug!("threshold for unknown trigger '{trigger}' ignored"),
                }
            }
            ControlCommand::LoadPreset { name } => {
                let path = self.resolve_preset_path(&name);
                let result = PresetDocument::load(&path).and_then(|doc| self.from_state(&doc));
                if let Err(e) = result {
                    self.diag.emit(
                        DiagnosticLevel::Error,
                        DiagnosticCode::ConfigInvalid,
                        format!("remote preset load '{name}': {e}"),
                        now,
                    );
                }
            }
            ControlCommand::SetBpmMute(mute) => self.bpm_osc.set_mute(mute),
            ControlCommand::BpmTap => {
                if let Some(bpm) = self.tap.tap(now) {
                    self.manual_bpm = Some(bpm);
                    self.bpm_osc.invalidate();
                }
            }
        }
    }

    fn resolve_preset_path(&self, name: &str) -> PathBuf {
        let raw = Path::new(name);
        if raw.is_absolute() || self.config.preset_dir.is_none() {
            return raw.to_path_buf();
        }
        let dir = self.config.preset_dir.as_ref().expect("checked above");
        if raw.extension().is_some() {
            dir.join(raw)
        } else {
            dir.join(format!("{name}.json"))
        }
    }

    fn report_transport(&mut self, now: SampleTime) {
        if let Some(dropped) = self.sender.take_overflow_report() {
            self.diag.emit(
                DiagnosticLevel::Warning,
                DiagnosticCode::TransportOverflow,
                format!("send queue overflow, dropped {dropped} message(s)"),
                now,
            );
        }
        if self.decode_errors > 0
            && now.saturating_sub(self.last_decode_report) >= DECODE_REPORT_INTERVAL
        {
            self.diag.emit(
                DiagnosticLevel::Warning,
                DiagnosticCode::ProtocolDecode,
                format!("dropped {} malformed incoming packet(s)", self.decode_errors),
                now,
            );
            self.decode_errors = 0;
            self.last_decode_report = now;
        }
        if self.send_failures > 0
            && now.saturating_sub(self.last_send_report) >= DECODE_REPORT_INTERVAL
        {
            self.diag.emit(
                DiagnosticLevel::Warning,
                DiagnosticCode::TransportTransient,
                format!("{} OSC message(s) dropped by the transport", self.send_failures),
                now,
            );
            self.send_failures = 0;
            self.last_send_report = now;
        }
    }

    fn maybe_status(&mut self, now: SampleTime) {
        if now.saturating_sub(self.last_status) < STATUS_INTERVAL {
            return;
        }
        self.last_status = now;
        let bpm = self
            .tempo
            .estimate()
            .bpm
            .map_or_else(|| "-".to_string(), |b| format!("{b:.1}"));
        let audio = self
            .audio
            .as_ref()
            .and_then(|a| a.active_name())
            .unwrap_or_else(|| "(none)".to_string());
        self.diag.emit(
            DiagnosticLevel::Info,
            DiagnosticCode::Status,
            format!("BPM={bpm}, audio={audio}, overruns={}", self.overruns),
            now,
        );
    }

    fn maybe_retry_audio(&mut self) {
        if Instant::now() < self.audio_retry_at {
            return;
        }
        self.audio_retry_at = Instant::now() + AUDIO_RETRY_INTERVAL;
        let now = self.now();
        if let Some(source) = self.audio.as_mut() {
            if source.active_name().is_none() {
                match source.start() {
                    Ok(()) => {
                        self.onset.reset();
                        self.diag.emit(
                            DiagnosticLevel::Info,
                            DiagnosticCode::AudioUnavailable,
                            "audio source recovered",
                            now,
                        );
                    }
                    Err(e) => tracing::debug!("audio retry failed: {e}"),
                }
            }
        }
    }

    /// Drive ticks at the nominal rate until `stop` is set, then shut down
    ///
    /// A tick late by more than one period is skipped, never backlogged.
    pub fn run(&mut self, stop: &AtomicBool) {
        let period = Duration::from_secs_f64(1.0 / TICK_RATE as f64);
        let mut next = Instant::now();

        tracing::info!("Engine running at {TICK_RATE} Hz");
        while !stop.load(Ordering::Relaxed) {
            let before = Instant::now();
            if before < next {
                std::thread::sleep(next - before);
            }
            self.tick();
            next += period;

            let after = Instant::now();
            if after > next + period {
                let missed =
                    ((after - next).as_secs_f64() / period.as_secs_f64()).floor() as u64;
                self.overruns += missed.max(1);
                self.diag.emit(
                    DiagnosticLevel::Warning,
                    DiagnosticCode::TickOverrun,
                    format!("tick deadline missed, skipping {} period(s)", missed.max(1)),
                    self.now(),
                );
                next = after;
            }
            self.maybe_retry_audio();
        }
        self.shutdown();
    }

    /// Stop audio, drain outgoing messages (bounded) and close transports
    ///
    /// Idempotent; `run` calls this on exit.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        tracing::info!("Stopping engine");

        if let Some(source) = self.audio.as_mut() {
            source.stop();
        }

        let deadline = Instant::now() + SHUTDOWN_DRAIN_CAP;
        while self.sender.pending() > 0 && Instant::now() < deadline {
            self.sender.flush_tick();
            std::thread::sleep(Duration::from_millis(5));
        }
        if self.sender.pending() > 0 {
            tracing::warn!(
                "abandoning {} in-flight OSC message(s) at shutdown",
                self.sender.pending()
            );
        }
    }

    // -- Preset state --

    /// Snapshot all mutable configuration into a preset document
    ///
    /// Unknown keys from the last applied document are carried through.
    pub fn to_state(&self) -> PresetDocument {
        let mut doc = self.preset_base.clone();
        doc.set(&["formatVersion"], PRESET_FORMAT_VERSION);
        doc.set(&["lowSoloMode"], self.low_solo);

        doc.set(&["dsp", "gain"], self.spectrum.gain() as f64);
        doc.set(&["dsp", "compression"], self.spectrum.compression() as f64);
        doc.set(&["dsp", "decibel"], self.spectrum.decibel_mode());
        doc.set(&["dsp", "agc"], self.spectrum.agc_enabled());

        doc.set(&["bpm", "min"], self.tempo.min_bpm() as f64);
        doc.set(&["bpm", "max"], self.tempo.max_bpm() as f64);
        doc.set(&["bpm", "mute"], self.bpm_osc.mute());
        doc.set(
            &["bpm", "osc", "commands"],
            Value::Array(
                self.bpm_osc
                    .commands_text()
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            ),
        );

        for trigger in &self.triggers {
            let name = trigger.name().as_str();
            if let Some(center) = trigger.center_hz() {
                doc.set(&["triggers", name, "midFreq"], center as f64);
            }
            if let Some(width) = trigger.width() {
                doc.set(&["triggers", name, "width"], width as f64);
            }
            doc.set(&["triggers", name, "threshold"], trigger.threshold() as f64);
            let filter = trigger.filter();
            doc.set(&["triggers", name, "mute"], filter.mute());
            doc.set(&["triggers", name, "onDelay"], filter.on_delay() as f64);
            doc.set(&["triggers", name, "offDelay"], filter.off_delay() as f64);
            doc.set(&["triggers", name, "maxHold"], filter.max_hold() as f64);

            let binding = filter.binding();
            doc.set(&["triggers", name, "osc", "on"], template_text(&binding.on_message));
            doc.set(
                &["triggers", name, "osc", "off"],
                template_text(&binding.off_message),
            );
            doc.set(
                &["triggers", name, "osc", "level"],
                template_text(&binding.level_message),
            );
            doc.set(
                &["triggers", name, "osc", "levelMin"],
                binding.level_min as f64,
            );
            doc.set(
                &["triggers", name, "osc", "levelMax"],
                binding.level_max as f64,
            );
            doc.set(&["triggers", name, "osc", "label"], binding.label.clone());
        }

        doc
    }

    /// Apply a preset document atomically
    ///
    /// The document is validated in full first; on any error the prior
    /// state is kept and the error surfaced. Must be called between ticks.
    pub fn from_state(&mut self, doc: &PresetDocument) -> Result<()> {
        validate_state(doc)?;

        if let Some(low_solo) = doc.get_bool(&["lowSoloMode"]) {
            self.low_solo = low_solo;
        }
        if let Some(gain) = doc.get_f32(&["dsp", "gain"]) {
            self.spectrum.set_gain(gain);
        }
        if let Some(compression) = doc.get_f32(&["dsp", "compression"]) {
            self.spectrum.set_compression(compression);
        }
        if let Some(decibel) = doc.get_bool(&["dsp", "decibel"]) {
            self.spectrum.set_decibel_mode(decibel);
        }
        if let Some(agc) = doc.get_bool(&["dsp", "agc"]) {
            self.spectrum.set_agc_enabled(agc);
        }

        let min = doc.get_f32(&["bpm", "min"]);
        let max = doc.get_f32(&["bpm", "max"]);
        if min.is_some() || max.is_some() {
            self.tempo.set_range(
                min.unwrap_or_else(|| self.tempo.min_bpm()),
                max.unwrap_or_else(|| self.tempo.max_bpm()),
            );
        }
        if let Some(mute) = doc.get_bool(&["bpm", "mute"]) {
            self.bpm_osc.set_mute(mute);
        }
        if let Some(commands) = doc.get_str_list(&["bpm", "osc", "commands"]) {
            self.bpm_osc
                .set_commands(&commands)
                .map_err(|e| CoreError::ConfigInvalid(format!("bpm commands: {e}")))?;
        }

        for name in TriggerName::ALL {
            let key = name.as_str();
            if doc.get(&["triggers", key]).is_none() {
                continue;
            }
            let trigger = self
                .triggers
                .iter_mut()
                .find(|t| t.name() == name)
                .expect("all six triggers exist");

            if let Some(center) = doc.get_f32(&["triggers", key, "midFreq"]) {
                trigger.set_center_hz(center);
            }
            if let Some(width) = doc.get_f32(&["triggers", key, "width"]) {
                trigger.set_width(width);
            }
            if let Some(threshold) = doc.get_f32(&["triggers", key, "threshold"]) {
                trigger.set_threshold(threshold);
            }
            let filter = trigger.filter_mut();
            if let Some(mute) = doc.get_bool(&["triggers", key, "mute"]) {
                filter.set_mute(mute);
            }
            if let Some(v) = doc.get_f32(&["triggers", key, "onDelay"]) {
                filter.set_on_delay(v);
            }
            if let Some(v) = doc.get_f32(&["triggers", key, "offDelay"]) {
                filter.set_off_delay(v);
            }
            if let Some(v) = doc.get_f32(&["triggers", key, "maxHold"]) {
                filter.set_max_hold(v);
            }

            let binding = filter.binding_mut();
            if let Some(text) = doc.get_str(&["triggers", key, "osc", "on"]) {
                binding.on_message = parse_template(text)?;
            }
            if let Some(text) = doc.get_str(&["triggers", key, "osc", "off"]) {
                binding.off_message = parse_template(text)?;
            }
            if let Some(text) = doc.get_str(&["triggers", key, "osc", "level"]) {
                binding.level_message = parse_template(text)?;
            }
            if let Some(v) = doc.get_f32(&["triggers", key, "osc", "levelMin"]) {
                binding.level_min = v;
            }
            if let Some(v) = doc.get_f32(&["triggers", key, "osc", "levelMax"]) {
                binding.level_max = v;
            }
            if let Some(label) = doc.get_str(&["triggers", key, "osc", "label"]) {
                binding.label = label.to_string();
            }
        }

        self.bpm_osc.invalidate();
        self.preset_base = doc.clone();
        Ok(())
    }

    /// Load a preset file and apply it
    pub fn load_preset(&mut self, path: &Path) -> Result<()> {
        let doc = PresetDocument::load(path)?;
        self.from_state(&doc)
    }

    /// Snapshot the current state to a preset file
    pub fn save_preset(&self, path: &Path) -> Result<()> {
        self.to_state().save(path)
    }
}

/// Empty template text means "not configured"
fn parse_template(text: &str) -> Result<Option<MessageTemplate>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    MessageTemplate::parse(text)
        .map(Some)
        .map_err(|e| CoreError::ConfigInvalid(format!("osc template '{text}': {e}")))
}

fn template_text(template: &Option<MessageTemplate>) -> String {
    template
        .as_ref()
        .map(|t| t.source().to_string())
        .unwrap_or_default()
}

/// Whole-document validation; nothing is applied when any field is bad
fn validate_state(doc: &PresetDocument) -> Result<()> {
    let check_range = |path: &[&str], lo: f32, hi: f32| -> Result<()> {
        if let Some(v) = doc.get_f32(path) {
            if !v.is_finite() || v < lo || v > hi {
                return Err(CoreError::ConfigInvalid(format!(
                    "{} = {v} outside [{lo}, {hi}]",
                    path.join(".")
                )));
            }
        } else if doc.get(path).is_some() {
            return Err(CoreError::ConfigInvalid(format!(
                "{} is not a number",
                path.join(".")
            )));
        }
        Ok(())
    };

    check_range(&["dsp", "gain"], 0.0, 64.0)?;
    check_range(&["dsp", "compression"], 0.5, 2.0)?;
    check_range(&["bpm", "min"], 30.0, 300.0)?;
    check_range(&["bpm", "max"], 30.0, 300.0)?;
    if let (Some(min), Some(max)) = (doc.get_f32(&["bpm", "min"]), doc.get_f32(&["bpm", "max"])) {
        if min >= max {
            return Err(CoreError::ConfigInvalid(format!(
                "bpm range [{min}, {max}] is empty"
            )));
        }
    }
    if let Some(commands) = doc.get_str_list(&["bpm", "osc", "commands"]) {
        for text in &commands {
            MessageTemplate::parse(text)
                .map_err(|e| CoreError::ConfigInvalid(format!("bpm command '{text}': {e}")))?;
        }
    }

    for name in TriggerName::ALL {
        let key = name.as_str();
        check_range(&["triggers", key, "threshold"], 0.0, 1.0)?;
        check_range(&["triggers", key, "width"], 0.0, 1.0)?;
        check_range(&["triggers", key, "midFreq"], 1.0, 22_050.0)?;
        check_range(&["triggers", key, "onDelay"], 0.0, f32::MAX)?;
        check_range(&["triggers", key, "offDelay"], 0.0, f32::MAX)?;
        check_range(&["triggers", key, "maxHold"], 0.0, f32::MAX)?;
        for field in ["on", "off", "level"] {
            if let Some(text) = doc.get_str(&["triggers", key, "osc", field]) {
                if !text.trim().is_empty() {
                    MessageTemplate::parse(text).map_err(|e| {
                        CoreError::ConfigInvalid(format!(
                            "triggers.{key}.osc.{field} '{text}': {e}"
                        ))
                    })?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let (engine, _rx) = Engine::new(EngineConfig::default()).unwrap();
        engine
    }

    #[test]
    fn test_tick_advances_sample_time() {
        let mut e = engine();
        assert_eq!(e.now(), 0);
        e.tick();
        assert_eq!(e.now(), SAMPLES_PER_TICK);
        e.tick();
        assert_eq!(e.now(), 2 * SAMPLES_PER_TICK);
    }

    #[test]
    fn test_state_roundtrip_is_noop() {
        let mut e = engine();
        e.spectrum_mut().set_gain(12.0);
        e.set_low_solo_mode(true);
        e.trigger_mut(TriggerName::Bass).set_threshold(0.73);
        e.trigger_mut(TriggerName::Silence)
            .filter_mut()
            .set_off_delay(1.5);

        let state = e.to_state();
        e.from_state(&state).unwrap();
        let again = e.to_state();
        assert_eq!(state.to_json_pretty(), again.to_json_pretty());
        assert_eq!(e.spectrum().gain(), 12.0);
        assert_eq!(e.trigger(TriggerName::Bass).threshold(), 0.73);
    }

    #[test]
    fn test_unknown_keys_survive_state_cycle() {
        let mut e = engine();
        let text = r#"{
            "formatVersion": 4,
            "futureRoot": [1, 2, 3],
            "triggers": {"bass": {"threshold": 0.73, "future": 42}}
        }"#;
        let doc = PresetDocument::from_json(text).unwrap();
        e.from_state(&doc).unwrap();
        assert_eq!(e.trigger(TriggerName::Bass).threshold(), 0.73);

        let out = e.to_state();
        assert_eq!(
            out.get(&["triggers", "bass", "future"]).and_then(Value::as_i64),
            Some(42)
        );
        assert!(out.get(&["futureRoot"]).is_some());
    }

    #[test]
    fn test_invalid_state_keeps_prior_config() {
        let mut e = engine();
        e.spectrum_mut().set_gain(8.0);

        let bad = PresetDocument::from_json(
            r#"{"formatVersion": 4, "dsp": {"gain": 999.0}}"#,
        )
        .unwrap();
        assert!(e.from_state(&bad).is_err());
        assert_eq!(e.spectrum().gain(), 8.0);

        let bad_bpm = PresetDocument::from_json(
            r#"{"formatVersion": 4, "bpm": {"min": 180.0, "max": 100.0}}"#,
        )
        .unwrap();
        assert!(e.from_state(&bad_bpm).is_err());
    }

    #[test]
    fn test_default_trigger_tuning() {
        let e = engine();
        assert_eq!(e.trigger(TriggerName::Bass).center_hz(), Some(80.0));
        assert_eq!(e.trigger(TriggerName::LoMid).center_hz(), Some(400.0));
        assert_eq!(e.trigger(TriggerName::HiMid).center_hz(), Some(1000.0));
        assert_eq!(e.trigger(TriggerName::High).center_hz(), Some(5000.0));
        assert_eq!(e.trigger(TriggerName::Envelope).center_hz(), None);
        assert_eq!(e.trigger(TriggerName::Silence).threshold(), 0.2);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut e = engine();
        e.shutdown();
        e.shutdown();
    }

    #[test]
    fn test_control_threshold_applies() {
        let mut e = engine();
        e.apply_control(
            ControlCommand::SetTriggerThreshold {
                trigger: "bass".into(),
                value: 0.9,
            },
            0,
        );
        assert_eq!(e.trigger(TriggerName::Bass).threshold(), 0.9);

        // Unknown names are ignored.
        e.apply_control(
            ControlCommand::SetTriggerThreshold {
                trigger: "kick".into(),
                value: 0.1,
            },
            0,
        );
    }

    #[test]
    fn test_bpm_tap_overrides_until_lock() {
        let mut e = engine();
        let half_second = SAMPLE_RATE as u64 / 2;
        for i in 0..4 {
            e.apply_control(ControlCommand::BpmTap, i * half_second);
        }
        let manual = e.manual_bpm.expect("taps yield a manual bpm");
        assert!((manual - 120.0).abs() < 1.0);
    }
}

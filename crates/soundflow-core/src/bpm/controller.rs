//! BPM output over OSC
//!
//! Holds the user-configured command list. Commands containing the `$v`
//! placeholder carry the tempo value and are (re)sent when the estimate
//! moves by more than half a BPM; commands without a placeholder are beat
//! pulses, sent once per detected onset. A stale estimate or the mute flag
//! suppresses all of it.

use soundflow_control::{ControlError, MessageTemplate, TemplateValue};

use crate::OscSink;

/// Minimum BPM movement that triggers a value re-send
const BPM_RESEND_DELTA: f32 = 0.5;

/// Tempo and beat emission
pub struct BpmOscController {
    commands: Vec<MessageTemplate>,
    mute: bool,
    last_sent_bpm: Option<f32>,
}

impl BpmOscController {
    /// Controller with the default single beat pulse command
    pub fn new() -> Self {
        Self {
            commands: vec![MessageTemplate::parse("/beat").expect("static template")],
            mute: false,
            last_sent_bpm: None,
        }
    }

    /// Whether BPM output is muted
    pub fn mute(&self) -> bool {
        self.mute
    }

    /// Mute or unmute BPM output
    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    /// Replace the command list from its text form
    pub fn set_commands(&mut self, texts: &[String]) -> Result<(), ControlError> {
        let mut commands = Vec::with_capacity(texts.len());
        for text in texts {
            commands.push(MessageTemplate::parse(text)?);
        }
        self.commands = commands;
        self.last_sent_bpm = None;
        Ok(())
    }

    /// The command list in text form
    pub fn commands_text(&self) -> Vec<String> {
        self.commands.iter().map(|t| t.source().to_string()).collect()
    }

    /// Report a (possibly unchanged) tempo estimate
    pub fn on_bpm(&mut self, bpm: f32, stale: bool, sink: &mut dyn OscSink) {
        if self.mute || stale || !bpm.is_finite() {
            return;
        }
        let moved = self
            .last_sent_bpm
            .map_or(true, |last| (bpm - last).abs() > BPM_RESEND_DELTA);
        if !moved {
            return;
        }
        self.last_sent_bpm = Some(bpm);
        for tpl in self.commands.iter().filter(|t| t.has_placeholder()) {
            sink.push(tpl.realize(Some(TemplateValue::Float(bpm))));
        }
    }

    /// Report a detected onset
    pub fn on_beat(&mut self, stale: bool, sink: &mut dyn OscSink) {
        if self.mute || stale {
            return;
        }
        for tpl in self.commands.iter().filter(|t| !t.has_placeholder()) {
            sink.push(tpl.realize_plain());
        }
    }

    /// Forget the last sent value so the next estimate is always sent
    pub fn invalidate(&mut self) {
        self.last_sent_bpm = None;
    }
}

impl Default for BpmOscController {
    fn default() -> Self {
        Self::new()
    }
}

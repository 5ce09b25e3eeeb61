//! Trigger timing filter
//!
//! Sits between a detector's raw above/below-threshold decision and the
//! wire. Adds on-delay (suppress blips), off-delay (bridge dropouts) and
//! max-hold (force release of stuck triggers). Timers are sample-time
//! counters advanced by the tick loop, so behaviour is deterministic under
//! slow ticks and offline tests.
//!
//! ```text
//!            trigger_on()              on_delay expires
//!     Idle ──────────────▶ OnPending ──────────────────▶ Active ──┐
//!      ▲                      │ trigger_off()              │      │ max_hold
//!      │◀─────────────────────┘                            │      │ expires
//!      │                                  trigger_off()    ▼      │
//!      │   off_delay expires                               │      │
//!      └◀──────────────────────── OffPending ◀─────────────┘      │
//!      ▲                              │ trigger_on() (back to Active)
//!      └──────────────────────────────┴───────────────────────────┘
//! ```

use soundflow_control::{MessageTemplate, TemplateValue};

use crate::{OscSink, SampleTime, SAMPLE_RATE};

/// Minimum spacing between level messages: 20 ms in samples
pub const LEVEL_MESSAGE_INTERVAL: SampleTime = (SAMPLE_RATE as u64) / 50;

/// Outgoing message configuration of one trigger
#[derive(Debug, Clone, Default)]
pub struct OscBinding {
    /// Sent on entry to Active
    pub on_message: Option<MessageTemplate>,
    /// Sent on exit from Active
    pub off_message: Option<MessageTemplate>,
    /// Sent while Active, rate limited, carrying the mapped level
    pub level_message: Option<MessageTemplate>,
    /// Level output range lower bound
    pub level_min: f32,
    /// Level output range upper bound
    pub level_max: f32,
    /// Free-form label shown by hosts
    pub label: String,
}

impl OscBinding {
    /// Binding with the default unit level range and no messages
    pub fn new() -> Self {
        Self {
            level_min: 0.0,
            level_max: 1.0,
            ..Default::default()
        }
    }
}

/// Filter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Released, no timers running
    Idle,
    /// Detector asserted, waiting out the on-delay
    OnPending,
    /// Output on
    Active,
    /// Detector released, waiting out the off-delay (output still on)
    OffPending,
}

/// Delay/hold state machine with OSC emission
pub struct TriggerFilter {
    state: FilterState,
    /// When the pending state was entered
    pending_since: SampleTime,
    /// When Active was last entered (max-hold reference)
    active_since: SampleTime,
    on_delay: f32,
    off_delay: f32,
    max_hold: f32,
    mute: bool,
    binding: OscBinding,
    last_level: f32,
    last_level_sent: Option<SampleTime>,
    on_transitions: u64,
    off_transitions: u64,
}

impl TriggerFilter {
    /// Create an idle filter with zero delays
    pub fn new(binding: OscBinding) -> Self {
        Self {
            state: FilterState::Idle,
            pending_since: 0,
            active_since: 0,
            on_delay: 0.0,
            off_delay: 0.0,
            max_hold: 0.0,
            mute: false,
            binding,
            last_level: 0.0,
            last_level_sent: None,
            on_transitions: 0,
            off_transitions: 0,
        }
    }

    /// Whether the output is currently on (Active or OffPending)
    pub fn is_active(&self) -> bool {
        matches!(self.state, FilterState::Active | FilterState::OffPending)
    }

    /// Current machine state
    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Level fed in on the most recent tick
    pub fn last_level(&self) -> f32 {
        self.last_level
    }

    /// Completed on transitions since construction
    pub fn on_transitions(&self) -> u64 {
        self.on_transitions
    }

    /// Completed off transitions since construction
    pub fn off_transitions(&self) -> u64 {
        self.off_transitions
    }

    // -- Configuration --

    /// On-delay in seconds
    pub fn on_delay(&self) -> f32 {
        self.on_delay
    }

    /// Set the on-delay, clamped to ≥ 0
    pub fn set_on_delay(&mut self, seconds: f32) {
        self.on_delay = seconds.max(0.0);
    }

    /// Off-delay in seconds
    pub fn off_delay(&self) -> f32 {
        self.off_delay
    }

    /// Set the off-delay, clamped to ≥ 0
    pub fn set_off_delay(&mut self, seconds: f32) {
        self.off_delay = seconds.max(0.0);
    }

    /// Max-hold in seconds; 0 disables the forced release
    pub fn max_hold(&self) -> f32 {
        self.max_hold
    }

    /// Set the max-hold, clamped to ≥ 0
    pub fn set_max_hold(&mut self, seconds: f32) {
        self.max_hold = seconds.max(0.0);
    }

    /// Whether wire output is suppressed
    pub fn mute(&self) -> bool {
        self.mute
    }

    /// Mute or unmute; state transitions keep running either way
    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    /// Message configuration
    pub fn binding(&self) -> &OscBinding {
        &self.binding
    }

    /// Mutable message configuration
    pub fn binding_mut(&mut self) -> &mut OscBinding {
        &mut self.binding
    }

    // -- Detector inputs --

    /// Detector asserted this tick
    ///
    /// Idempotent while OnPending or Active; during OffPending it cancels
    /// the off timer and returns to Active without re-emitting.
    pub fn trigger_on(&mut self, now: SampleTime) {
        match self.state {
            FilterState::Idle => {
                self.state = FilterState::OnPending;
                self.pending_since = now;
            }
            FilterState::OffPending => {
                self.state = FilterState::Active;
            }
            FilterState::OnPending | FilterState::Active => {}
        }
    }

    /// Detector released this tick
    ///
    /// Idempotent while Idle or OffPending; during OnPending it cancels the
    /// on timer without any emission.
    pub fn trigger_off(&mut self, now: SampleTime) {
        match self.state {
            FilterState::OnPending => {
                self.state = FilterState::Idle;
            }
            FilterState::Active => {
                self.state = FilterState::OffPending;
                self.pending_since = now;
            }
            FilterState::Idle | FilterState::OffPending => {}
        }
    }

    // -- Tick processing --

    /// Expire the max-hold timer; run before the detector check so a
    /// still-asserting detector can re-enter in the same tick
    pub fn begin_tick(&mut self, now: SampleTime, sink: &mut dyn OscSink) {
        if self.is_active() && self.max_hold > 0.0 {
            let hold = secs_to_samples(self.max_hold);
            if now.saturating_sub(self.active_since) >= hold {
                self.release(now, sink);
            }
        }
    }

    /// Feed the detector level and decision, then expire delay timers
    pub fn process(
        &mut self,
        level: f32,
        asserted: bool,
        now: SampleTime,
        sink: &mut dyn OscSink,
    ) {
        self.update_level(level, now, sink);
        if asserted {
            self.trigger_on(now);
        } else {
            self.trigger_off(now);
        }
        self.advance(now, sink);
    }

    /// Record the level and emit the rate-limited level message while active
    ///
    /// Runs before any transition of the same tick so level messages always
    /// precede their trigger's on/off messages.
    pub fn update_level(&mut self, level: f32, now: SampleTime, sink: &mut dyn OscSink) {
        self.last_level = level;
        if !self.is_active() {
            return;
        }
        let due = self
            .last_level_sent
            .map_or(true, |at| now.saturating_sub(at) >= LEVEL_MESSAGE_INTERVAL);
        if due {
            self.send_level(now, sink);
        }
    }

    /// Expire on/off delay timers
    pub fn advance(&mut self, now: SampleTime, sink: &mut dyn OscSink) {
        match self.state {
            FilterState::OnPending => {
                let delay = secs_to_samples(self.on_delay);
                if now.saturating_sub(self.pending_since) >= delay {
                    self.state = FilterState::Active;
                    self.active_since = now;
                    self.on_transitions += 1;
                    if !self.mute {
                        if let Some(tpl) = &self.binding.on_message {
                            sink.push(tpl.realize_plain());
                        }
                    }
                }
            }
            FilterState::OffPending => {
                let delay = secs_to_samples(self.off_delay);
                if now.saturating_sub(self.pending_since) >= delay {
                    self.release(now, sink);
                }
            }
            FilterState::Idle | FilterState::Active => {}
        }
    }

    /// Exit the active output: flush the last level, emit off, go Idle
    fn release(&mut self, now: SampleTime, sink: &mut dyn OscSink) {
        // Final level value is flushed regardless of the rate limit.
        self.send_level(now, sink);
        self.state = FilterState::Idle;
        self.off_transitions += 1;
        if !self.mute {
            if let Some(tpl) = &self.binding.off_message {
                sink.push(tpl.realize_plain());
            }
        }
    }

    fn send_level(&mut self, now: SampleTime, sink: &mut dyn OscSink) {
        if self.mute {
            return;
        }
        if let Some(tpl) = &self.binding.level_message {
            let value = self.binding.level_min
                + (self.binding.level_max - self.binding.level_min) * self.last_level;
            sink.push(tpl.realize(Some(TemplateValue::Float(value))));
            self.last_level_sent = Some(now);
        }
    }
}

/// Seconds → samples at the engine rate
#[inline]
fn secs_to_samples(seconds: f32) -> SampleTime {
    (seconds as f64 * SAMPLE_RATE as f64) as SampleTime
}

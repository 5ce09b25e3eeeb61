//! Incoming OSC control mapping
//!
//! Remote peers may adjust a small, closed set of runtime parameters. The
//! address space is fixed for wire compatibility; anything outside it is
//! ignored by the caller (`parse_control` returns `None`).

use crate::osc::{OscArg, OscMessage};

/// Address prefix of the incoming control namespace
pub const CONTROL_PREFIX: &str = "/sound2osc/in";

/// A decoded remote-control request
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// `/sound2osc/in/trigger/<name>/threshold f`
    SetTriggerThreshold {
        /// Trigger identifier (`bass`, `loMid`, ...)
        trigger: String,
        /// New threshold, clamped to [0, 1] by the engine
        value: f32,
    },
    /// `/sound2osc/in/preset/load s`
    LoadPreset {
        /// Preset name or path
        name: String,
    },
    /// `/sound2osc/in/bpm/mute i` (non-zero mutes)
    SetBpmMute(bool),
    /// `/sound2osc/in/bpm/tap`
    BpmTap,
}

/// Map an incoming message onto a control command
///
/// Returns `None` for unknown addresses and for known addresses carrying the
/// wrong argument types, both of which are silently ignored per protocol.
pub fn parse_control(msg: &OscMessage) -> Option<ControlCommand> {
    let rest = msg.addr.strip_prefix(CONTROL_PREFIX)?;
    let parts: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    match parts.as_slice() {
        ["trigger", name, "threshold"] => {
            let value = first_float(msg)?;
            Some(ControlCommand::SetTriggerThreshold {
                trigger: (*name).to_string(),
                value,
            })
        }
        ["preset", "load"] => match msg.args.first() {
            Some(OscArg::Str(name)) => Some(ControlCommand::LoadPreset { name: name.clone() }),
            _ => None,
        },
        ["bpm", "mute"] => match msg.args.first() {
            Some(OscArg::Int(v)) => Some(ControlCommand::SetBpmMute(*v != 0)),
            _ => None,
        },
        ["bpm", "tap"] => Some(ControlCommand::BpmTap),
        _ => None,
    }
}

/// Extract the leading numeric argument as a float
fn first_float(msg: &OscMessage) -> Option<f32> {
    match msg.args.first() {
        Some(OscArg::Float(v)) if v.is_finite() => Some(*v),
        Some(OscArg::Int(v)) => Some(*v as f32),
        _ => None,
    }
}

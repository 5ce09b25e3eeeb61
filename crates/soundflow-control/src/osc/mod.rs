//! OSC 1.0 / 1.1 message model
//!
//! The wire layout (4-byte alignment, big-endian arguments, `#bundle`
//! containers) lives in [`packet`]; SLIP framing for stream transports in
//! [`slip`]; user-facing message templates in [`template`].

pub mod packet;
pub mod slip;
pub mod template;

use crate::error::{ControlError, Result};

/// A single OSC argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    /// 32-bit big-endian signed integer (`i`)
    Int(i32),
    /// 32-bit big-endian IEEE 754 float (`f`)
    Float(f32),
    /// Null-terminated, 4-byte padded string (`s`)
    Str(String),
    /// Length-prefixed binary blob (`b`)
    Blob(Vec<u8>),
}

impl OscArg {
    /// The OSC type tag character for this argument
    pub fn type_tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
            OscArg::Blob(_) => 'b',
        }
    }
}

/// An OSC message: address pattern plus arguments
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    /// Address pattern, must start with `/`
    pub addr: String,
    /// Arguments in wire order
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// Create a message without arguments
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            args: Vec::new(),
        }
    }

    /// Create a message with arguments
    pub fn with_args(addr: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            addr: addr.into(),
            args,
        }
    }

    /// Validate the address pattern (non-empty, leading slash, no spaces)
    pub fn validate(&self) -> Result<()> {
        if !self.addr.starts_with('/') {
            return Err(ControlError::InvalidAddress(self.addr.clone()));
        }
        if self.addr.contains(' ') || self.addr.contains('\0') {
            return Err(ControlError::InvalidAddress(self.addr.clone()));
        }
        Ok(())
    }
}

/// An OSC bundle: timetag plus contained messages
#[derive(Debug, Clone, PartialEq)]
pub struct OscBundle {
    /// 64-bit NTP-style timetag; `TIMETAG_IMMEDIATE` means "now"
    pub timetag: u64,
    /// Bundle elements
    pub elements: Vec<OscMessage>,
}

/// The special "immediately" timetag value
pub const TIMETAG_IMMEDIATE: u64 = 1;

impl OscBundle {
    /// Create a bundle with the immediate timetag
    pub fn immediate(elements: Vec<OscMessage>) -> Self {
        Self {
            timetag: TIMETAG_IMMEDIATE,
            elements,
        }
    }
}

/// A decoded OSC packet: either a bare message or a bundle
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    /// A single message
    Message(OscMessage),
    /// A `#bundle` container
    Bundle(OscBundle),
}

impl OscPacket {
    /// Flatten the packet into its messages, dropping bundle structure
    pub fn into_messages(self) -> Vec<OscMessage> {
        match self {
            OscPacket::Message(msg) => vec![msg],
            OscPacket::Bundle(bundle) => bundle.elements,
        }
    }
}

//! SoundFlow Control - OSC wire protocol and transports
//!
//! This crate is the network-facing layer of SoundFlow:
//! - **OSC codec**: bit-exact OSC 1.0 packet encoding/decoding with bundles
//! - **SLIP**: double-ended framing for OSC over stream transports
//! - **Transports**: best-effort UDP and lazily reconnecting SLIP/TCP
//! - **Send queue**: bounded per-tick queue with the bundling rule
//! - **Templates**: user-configured outgoing message strings with `$v`
//! - **Mapping**: the closed incoming remote-control address set
//!
//! It knows nothing about audio analysis; the engine crate drives it.

pub mod error;
pub mod mapping;
pub mod net;
pub mod osc;

pub use error::{ControlError, Result};
pub use mapping::{parse_control, ControlCommand};
pub use net::{FlushReport, OscProtocol, OscSender, TcpTransport, UdpReceiver, UdpTransport};
pub use osc::template::{MessageTemplate, TemplateValue};
pub use osc::{OscArg, OscBundle, OscMessage, OscPacket, TIMETAG_IMMEDIATE};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parse_symmetry() {
        // Every emitted packet must parse back to the same address and args.
        let msg = OscMessage::with_args(
            "/soundflow/check",
            vec![OscArg::Int(3), OscArg::Float(0.25), OscArg::Str("x".into())],
        );
        let bytes = osc::packet::encode(&OscPacket::Message(msg.clone()));
        let parsed = osc::packet::decode(&bytes).unwrap();
        assert_eq!(parsed, OscPacket::Message(msg));
    }
}

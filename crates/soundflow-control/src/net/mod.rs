//! Outgoing OSC dispatch: send queue, bundling and transport selection
//!
//! All engine output funnels through [`OscSender`]. Messages are queued
//! during a processing tick and flushed once at its end; when a tick leaves
//! more than one message pending in OSC 1.0 mode they are wrapped into a
//! single immediate-timetag bundle. OSC 1.1 mode never bundles and always
//! goes SLIP-over-TCP.

pub mod tcp;
pub mod udp;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::osc::{packet, OscBundle, OscMessage, OscPacket};

pub use tcp::TcpTransport;
pub use udp::{UdpReceiver, UdpTransport};

/// Wire protocol selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscProtocol {
    /// OSC 1.0 over UDP datagrams (default)
    Udp,
    /// OSC 1.0 over SLIP-framed TCP, bundles allowed
    Tcp,
    /// OSC 1.1: SLIP-framed TCP, one bare packet per message
    Tcp11,
}

/// Capacity of the bounded send queue
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the recent-activity log
const ACTIVITY_LOG_CAPACITY: usize = 100;

/// Minimum spacing between queue-overflow reports
const OVERFLOW_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one queue flush
#[derive(Debug, Default, Clone, Copy)]
pub struct FlushReport {
    /// Messages handed to the transport
    pub sent: usize,
    /// Messages dropped because the transport failed
    pub failed: usize,
}

/// Queued, bundling OSC sender over a selectable transport
pub struct OscSender {
    enabled: bool,
    protocol: OscProtocol,
    udp: UdpTransport,
    tcp: TcpTransport,
    queue: VecDeque<OscMessage>,
    overflow_dropped: u64,
    last_overflow_report: Option<Instant>,
    log: VecDeque<String>,
}

impl OscSender {
    /// Create a sender aimed at `target`
    pub fn new(target: SocketAddr, protocol: OscProtocol) -> Result<Self> {
        Ok(Self {
            enabled: true,
            protocol,
            udp: UdpTransport::new(target)?,
            tcp: TcpTransport::new(target),
            queue: VecDeque::with_capacity(SEND_QUEUE_CAPACITY),
            overflow_dropped: 0,
            last_overflow_report: None,
            log: VecDeque::with_capacity(ACTIVITY_LOG_CAPACITY),
        })
    }

    /// Enable or disable wire output; a disabled sender discards enqueues
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether wire output is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current protocol
    pub fn protocol(&self) -> OscProtocol {
        self.protocol
    }

    /// Switch protocol; a live TCP connection is dropped when leaving TCP
    pub fn set_protocol(&mut self, protocol: OscProtocol) {
        if protocol == OscProtocol::Udp && self.protocol != OscProtocol::Udp {
            self.tcp.disconnect();
        }
        self.protocol = protocol;
    }

    /// Current destination
    pub fn target(&self) -> SocketAddr {
        self.udp.target()
    }

    /// Redirect both transports
    pub fn set_target(&mut self, target: SocketAddr) {
        self.udp.set_target(target);
        self.tcp.set_target(target);
    }

    /// Number of messages waiting for the next flush
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a message for the end-of-tick flush
    ///
    /// On overflow the oldest queued message is discarded; the drop is
    /// reported once per [`OVERFLOW_REPORT_INTERVAL`] via
    /// [`take_overflow_report`](Self::take_overflow_report).
    pub fn enqueue(&mut self, msg: OscMessage) {
        if !self.enabled {
            return;
        }
        if self.queue.len() >= SEND_QUEUE_CAPACITY {
            self.queue.pop_front();
            self.overflow_dropped += 1;
        }
        self.queue.push_back(msg);
    }

    /// Drain the queue onto the wire
    pub fn flush_tick(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        if self.queue.is_empty() {
            return report;
        }

        match self.protocol {
            OscProtocol::Tcp11 => {
                // OSC 1.1: one SLIP frame per message, never bundled.
                while let Some(msg) = self.queue.pop_front() {
                    let bytes = packet::encode(&OscPacket::Message(msg.clone()));
                    match self.tcp.send(&bytes) {
                        Ok(()) => {
                            report.sent += 1;
                            self.log_sent(&msg);
                        }
                        Err(e) => {
                            tracing::debug!("dropping OSC message {}: {e}", msg.addr);
                            report.failed += 1 + self.queue.len();
                            self.queue.clear();
                        }
                    }
                }
            }
            OscProtocol::Udp | OscProtocol::Tcp => {
                let pending = self.queue.len();
                let packet = if pending > 1 {
                    let elements: Vec<OscMessage> = self.queue.drain(..).collect();
                    for msg in &elements {
                        self.log_sent(msg);
                    }
                    OscPacket::Bundle(OscBundle::immediate(elements))
                } else {
                    let msg = self.queue.pop_front().expect("queue non-empty");
                    self.log_sent(&msg);
                    OscPacket::Message(msg)
                };
                let bytes = packet::encode(&packet);
                let result = match self.protocol {
                    OscProtocol::Udp => self.udp.send(&bytes),
                    _ => self.tcp.send(&bytes),
                };
                match result {
                    Ok(()) => report.sent += pending,
                    Err(e) => {
                        tracing::debug!("dropping {pending} OSC message(s): {e}");
                        report.failed += pending;
                    }
                }
            }
        }
        report
    }

    /// Take the pending overflow report, if one is due
    ///
    /// Returns the number of messages dropped since the last report, rate
    /// limited so a sustained overload produces one report per interval.
    pub fn take_overflow_report(&mut self) -> Option<u64> {
        if self.overflow_dropped == 0 {
            return None;
        }
        let due = self
            .last_overflow_report
            .map_or(true, |at| at.elapsed() >= OVERFLOW_REPORT_INTERVAL);
        if !due {
            return None;
        }
        self.last_overflow_report = Some(Instant::now());
        Some(std::mem::take(&mut self.overflow_dropped))
    }

    /// Recent wire activity in text form, oldest first
    ///
    /// Sent messages are prefixed `->`, received ones `<-`.
    pub fn activity_log(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(String::as_str)
    }

    /// Record an incoming message in the activity log
    pub fn log_received(&mut self, msg: &OscMessage) {
        self.log_line("<-", msg);
    }

    fn log_sent(&mut self, msg: &OscMessage) {
        self.log_line("->", msg);
    }

    fn log_line(&mut self, direction: &str, msg: &OscMessage) {
        if self.log.len() >= ACTIVITY_LOG_CAPACITY {
            self.log.pop_front();
        }
        let mut line = format!("{direction} {}", msg.addr);
        for arg in &msg.args {
            line.push(' ');
            match arg {
                crate::osc::OscArg::Int(v) => line.push_str(&v.to_string()),
                crate::osc::OscArg::Float(v) => line.push_str(&format!("{v:.3}")),
                crate::osc::OscArg::Str(s) => line.push_str(s),
                crate::osc::OscArg::Blob(b) => line.push_str(&format!("<{} bytes>", b.len())),
            }
        }
        self.log.push_back(line);
    }
}

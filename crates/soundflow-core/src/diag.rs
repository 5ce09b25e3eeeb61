//! Structured diagnostic events
//!
//! The engine never writes to the console or filesystem itself; anything a
//! host should know about arrives as a [`DiagnosticEvent`] on a bounded
//! channel. A slow or absent host loses events rather than stalling the
//! processing context.

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::SampleTime;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    /// Informational (status reports)
    Info,
    /// Degraded but operating
    Warning,
    /// An operation failed
    Error,
}

/// Machine-readable event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    /// Periodic status report
    Status,
    /// A processing tick missed its deadline and was skipped
    TickOverrun,
    /// The OSC send queue overflowed and dropped messages
    TransportOverflow,
    /// A transient transport failure (UDP send, TCP disconnect)
    TransportTransient,
    /// An incoming OSC packet failed to decode
    ProtocolDecode,
    /// The audio source is unavailable or mismatched
    AudioUnavailable,
    /// A preset document was rejected
    ConfigInvalid,
}

/// One diagnostic record
#[derive(Debug, Clone)]
pub struct DiagnosticEvent {
    /// Severity
    pub level: DiagnosticLevel,
    /// Classification
    pub code: DiagnosticCode,
    /// Human-readable detail
    pub message: String,
    /// Engine sample time at emission
    pub timestamp: SampleTime,
}

/// Engine-side emitter half of the diagnostics channel
pub struct DiagnosticHub {
    tx: Sender<DiagnosticEvent>,
}

impl DiagnosticHub {
    /// Create the hub and its host-owned receiver
    pub fn new(capacity: usize) -> (Self, Receiver<DiagnosticEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }

    /// Emit an event; dropped silently when the host is not draining
    pub fn emit(
        &self,
        level: DiagnosticLevel,
        code: DiagnosticCode,
        message: impl Into<String>,
        timestamp: SampleTime,
    ) {
        let event = DiagnosticEvent {
            level,
            code,
            message: message.into(),
            timestamp,
        };
        match event.level {
            DiagnosticLevel::Info => tracing::debug!(?event.code, "{}", event.message),
            DiagnosticLevel::Warning => tracing::warn!(?event.code, "{}", event.message),
            DiagnosticLevel::Error => tracing::error!(?event.code, "{}", event.message),
        }
        let _ = self.tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_receiver() {
        let (hub, rx) = DiagnosticHub::new(8);
        hub.emit(
            DiagnosticLevel::Warning,
            DiagnosticCode::TickOverrun,
            "late by 2 ticks",
            441_000,
        );
        let event = rx.try_recv().unwrap();
        assert_eq!(event.code, DiagnosticCode::TickOverrun);
        assert_eq!(event.timestamp, 441_000);
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let (hub, rx) = DiagnosticHub::new(2);
        for i in 0..10 {
            hub.emit(
                DiagnosticLevel::Info,
                DiagnosticCode::Status,
                format!("status {i}"),
                i,
            );
        }
        // Only the capacity survives; emit never blocked.
        assert_eq!(rx.try_iter().count(), 2);
    }
}

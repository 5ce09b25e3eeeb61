//! SLIP-framed TCP transport for OSC packets
//!
//! The connection is established lazily on first send and re-established
//! after failure, at most once every `RETRY_INTERVAL`. Writes carry a short
//! timeout; a timed-out or broken write drops the message and tears the
//! connection down for the next retry window.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use crate::error::{ControlError, Result};
use crate::osc::slip;

/// Minimum spacing between reconnect attempts
pub const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Cap on a single blocking write
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

/// Lazily connected, SLIP-framing TCP sender
pub struct TcpTransport {
    target: SocketAddr,
    stream: Option<TcpStream>,
    last_attempt: Option<Instant>,
}

impl TcpTransport {
    /// Create a transport aimed at `target`; no connection is made yet
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            stream: None,
            last_attempt: None,
        }
    }

    /// Whether a live connection is currently held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Current destination
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Redirect the transport; drops any live connection
    pub fn set_target(&mut self, target: SocketAddr) {
        if target != self.target {
            self.target = target;
            self.disconnect();
        }
    }

    /// Close the connection and clear retry pacing
    pub fn disconnect(&mut self) {
        self.stream = None;
        self.last_attempt = None;
    }

    fn ensure_connected(&mut self) -> Result<&mut TcpStream> {
        if self.stream.is_none() {
            if let Some(at) = self.last_attempt {
                if at.elapsed() < RETRY_INTERVAL {
                    return Err(ControlError::NotConnected(self.target.to_string()));
                }
            }
            self.last_attempt = Some(Instant::now());
            let stream = TcpStream::connect_timeout(&self.target, WRITE_TIMEOUT)
                .map_err(|e| ControlError::Transport(format!("connect {}: {e}", self.target)))?;
            stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
            stream.set_nodelay(true)?;
            tracing::info!("TCP connected to {}", self.target);
            self.stream = Some(stream);
        }
        Ok(self.stream.as_mut().expect("stream just set"))
    }

    /// SLIP-frame and send one raw packet
    ///
    /// On failure the message is dropped and the connection torn down; the
    /// next send after `RETRY_INTERVAL` reconnects.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let framed = slip::encode(payload);
        let target = self.target;
        let stream = self.ensure_connected()?;
        if let Err(e) = stream.write_all(&framed) {
            self.stream = None;
            tracing::warn!("TCP send to {} failed, scheduling reconnect: {e}", target);
            return Err(ControlError::Transport(format!("TCP send: {e}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::slip::SlipDecoder;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn test_lazy_connect_and_framing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = TcpTransport::new(addr);
        assert!(!transport.is_connected());

        transport.send(b"/tcp/test\0\0\0,\0\0\0").unwrap();
        assert!(transport.is_connected());

        let (mut peer, _) = listener.accept().unwrap();
        let mut buf = [0u8; 256];
        let n = peer.read(&mut buf).unwrap();

        let mut decoder = SlipDecoder::new();
        let frames = decoder.feed(&buf[..n]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with(b"/tcp/test"));
    }

    #[test]
    fn test_failed_connect_is_paced() {
        // A port nothing listens on; bind-then-drop guarantees it was free.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let mut transport = TcpTransport::new(addr);
        assert!(transport.send(b"/x\0\0,\0\0\0").is_err());

        // Second attempt inside the retry window must not reconnect.
        let result = transport.send(b"/x\0\0,\0\0\0");
        assert!(matches!(result, Err(ControlError::NotConnected(_))));
    }
}

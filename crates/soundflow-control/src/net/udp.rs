//! UDP transport for OSC packets

use std::net::{SocketAddr, UdpSocket};

use crate::error::{ControlError, Result};

/// Best-effort UDP sender bound to an ephemeral local port
pub struct UdpTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpTransport {
    /// Create a transport aimed at `target`
    pub fn new(target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self { socket, target })
    }

    /// Send one raw packet; failures are reported, never retried
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.socket
            .send_to(payload, self.target)
            .map_err(|e| ControlError::Transport(format!("UDP send to {}: {e}", self.target)))?;
        Ok(())
    }

    /// Current destination
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Redirect subsequent sends
    pub fn set_target(&mut self, target: SocketAddr) {
        self.target = target;
    }
}

/// Non-blocking UDP receiver for incoming OSC control messages
pub struct UdpReceiver {
    socket: UdpSocket,
    buf: Box<[u8; 1536]>,
}

impl UdpReceiver {
    /// Bind the receive socket on all interfaces
    pub fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            buf: Box::new([0u8; 1536]),
        })
    }

    /// Drain all pending datagrams
    pub fn poll(&mut self) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        loop {
            match self.socket.recv_from(&mut self.buf[..]) {
                Ok((len, _peer)) => packets.push(self.buf[..len].to_vec()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!("UDP receive error: {e}");
                    break;
                }
            }
        }
        packets
    }

    /// Local port the receiver is bound to
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_reaches_receiver() {
        let mut receiver = UdpReceiver::bind(0).unwrap();
        let port = receiver.local_port().unwrap();
        let transport = UdpTransport::new(format!("127.0.0.1:{port}").parse().unwrap()).unwrap();

        transport.send(b"/ping\0\0\0,\0\0\0").unwrap();

        // Allow the loopback datagram to land.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let packets = receiver.poll();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].starts_with(b"/ping"));
    }

    #[test]
    fn test_poll_empty_is_nonblocking() {
        let mut receiver = UdpReceiver::bind(0).unwrap();
        assert!(receiver.poll().is_empty());
    }
}

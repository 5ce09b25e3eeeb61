//! SLIP framing (RFC 1055) for OSC over stream transports
//!
//! Frames are double-ended: an END byte both opens and closes every packet,
//! which lets a receiver resynchronise after a partial frame. END bytes in
//! the payload are escaped as ESC ESC_END, ESC bytes as ESC ESC_ESC.

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Encode one payload as a double-ended SLIP frame
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(END);
    for &byte in payload {
        match byte {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            other => out.push(other),
        }
    }
    out.push(END);
    out
}

/// Incremental SLIP decoder for a byte stream
///
/// Feed arbitrary chunks; completed frames come back in arrival order.
/// Malformed escape sequences discard the frame in progress.
#[derive(Debug, Default)]
pub struct SlipDecoder {
    frame: Vec<u8>,
    escaped: bool,
}

impl SlipDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume stream bytes, returning any frames completed by this chunk
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if self.escaped {
                self.escaped = false;
                match byte {
                    ESC_END => self.frame.push(END),
                    ESC_ESC => self.frame.push(ESC),
                    _ => {
                        // Protocol violation; drop the partial frame and
                        // resynchronise on the next END.
                        self.frame.clear();
                    }
                }
                continue;
            }
            match byte {
                END => {
                    // Empty frames are the back-to-back delimiters of
                    // double-ended framing, not packets.
                    if !self.frame.is_empty() {
                        frames.push(std::mem::take(&mut self.frame));
                    }
                }
                ESC => self.escaped = true,
                other => self.frame.push(other),
            }
        }
        frames
    }

    /// Discard any partial frame state
    pub fn reset(&mut self) {
        self.frame.clear();
        self.escaped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_double_ended() {
        let framed = encode(b"abc");
        assert_eq!(framed[0], END);
        assert_eq!(*framed.last().unwrap(), END);
        assert_eq!(&framed[1..4], b"abc");
    }

    #[test]
    fn test_escapes() {
        let framed = encode(&[0xC0, 0xDB, 0x01]);
        assert_eq!(framed, vec![END, ESC, ESC_END, ESC, ESC_ESC, 0x01, END]);
    }

    #[test]
    fn test_roundtrip() {
        let payload = vec![0x00, 0xC0, 0xDB, 0xFF, 0xC0, 0xC0];
        let mut decoder = SlipDecoder::new();
        let frames = decoder.feed(&encode(&payload));
        assert_eq!(frames, vec![payload]);
    }

    #[test]
    fn test_split_delivery() {
        let framed = encode(b"hello world");
        let mut decoder = SlipDecoder::new();
        let (a, b) = framed.split_at(5);
        assert!(decoder.feed(a).is_empty());
        let frames = decoder.feed(b);
        assert_eq!(frames, vec![b"hello world".to_vec()]);
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let framed = encode(&[0xC0]);
        // Split exactly between ESC and ESC_END
        let esc_pos = framed.iter().position(|&b| b == ESC).unwrap();
        let mut decoder = SlipDecoder::new();
        assert!(decoder.feed(&framed[..esc_pos + 1]).is_empty());
        let frames = decoder.feed(&framed[esc_pos + 1..]);
        assert_eq!(frames, vec![vec![0xC0]]);
    }

    #[test]
    fn test_multiple_frames_one_chunk() {
        let mut stream = encode(b"one");
        stream.extend_from_slice(&encode(b"two"));
        let mut decoder = SlipDecoder::new();
        let frames = decoder.feed(&stream);
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_invalid_escape_drops_frame() {
        let mut decoder = SlipDecoder::new();
        let frames = decoder.feed(&[END, b'x', ESC, 0x42, b'y', END, b'z', END]);
        // First frame is poisoned by the bad escape; second survives.
        assert_eq!(frames, vec![vec![b'y'], vec![b'z']]);
    }
}

//! OSC 1.0 binary packet encoding and decoding
//!
//! Layout per the OSC 1.0 specification: the address pattern and the
//! `,`-prefixed type tag string are null-terminated and padded to 4 bytes,
//! arguments follow in declared order, every field 4-byte aligned, all
//! numbers big-endian. Bundles are `#bundle\0` + 64-bit timetag + a
//! size-prefixed element list.

use super::{OscArg, OscBundle, OscMessage, OscPacket};
use crate::error::{ControlError, Result};

const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Round `len` up to the next multiple of 4
#[inline]
fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Append a null-terminated, 4-byte padded OSC string
fn write_padded_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    // At least one terminating null, then pad to the 4-byte boundary.
    let padded = pad4(s.len() + 1);
    out.resize(out.len() + (padded - s.len()), 0);
}

/// Encode a single message into `out`
pub fn encode_message(msg: &OscMessage, out: &mut Vec<u8>) {
    write_padded_str(out, &msg.addr);

    let mut tags = String::with_capacity(msg.args.len() + 1);
    tags.push(',');
    for arg in &msg.args {
        tags.push(arg.type_tag());
    }
    write_padded_str(out, &tags);

    for arg in &msg.args {
        match arg {
            OscArg::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            OscArg::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
            OscArg::Str(s) => write_padded_str(out, s),
            OscArg::Blob(b) => {
                out.extend_from_slice(&(b.len() as i32).to_be_bytes());
                out.extend_from_slice(b);
                let padding = pad4(b.len()) - b.len();
                out.resize(out.len() + padding, 0);
            }
        }
    }
}

/// Encode a bundle into `out`
pub fn encode_bundle(bundle: &OscBundle, out: &mut Vec<u8>) {
    out.extend_from_slice(BUNDLE_TAG);
    out.extend_from_slice(&bundle.timetag.to_be_bytes());
    for msg in &bundle.elements {
        let mut element = Vec::new();
        encode_message(msg, &mut element);
        out.extend_from_slice(&(element.len() as i32).to_be_bytes());
        out.extend_from_slice(&element);
    }
}

/// Encode any packet into a fresh buffer
pub fn encode(packet: &OscPacket) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    match packet {
        OscPacket::Message(msg) => encode_message(msg, &mut out),
        OscPacket::Bundle(bundle) => encode_bundle(bundle, &mut out),
    }
    out
}

/// Cursor over a raw packet during decoding
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ControlError::OscDecode(format!(
                "truncated packet: wanted {} bytes, {} left",
                n,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    /// Read a null-terminated padded OSC string
    fn read_str(&mut self) -> Result<String> {
        let start = self.pos;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| start + i)
            .ok_or_else(|| ControlError::OscDecode("unterminated string".into()))?;
        let s = std::str::from_utf8(&self.data[start..end])
            .map_err(|_| ControlError::OscDecode("invalid UTF-8 in string".into()))?
            .to_string();
        // Consume through the padding.
        self.pos = start + pad4(end - start + 1);
        if self.pos > self.data.len() {
            return Err(ControlError::OscDecode("string padding past end".into()));
        }
        Ok(s)
    }

    fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(ControlError::OscDecode("negative blob length".into()));
        }
        let bytes = self.take(len as usize)?.to_vec();
        let padding = pad4(len as usize) - len as usize;
        self.take(padding)?;
        Ok(bytes)
    }
}

/// Decode a single message starting at the beginning of `data`
pub fn decode_message(data: &[u8]) -> Result<OscMessage> {
    let mut reader = Reader::new(data);
    let addr = reader.read_str()?;
    if !addr.starts_with('/') {
        return Err(ControlError::OscDecode(format!(
            "address does not start with '/': {addr}"
        )));
    }

    // The type tag string is mandatory in OSC 1.0; tolerate its absence for
    // legacy argument-free senders.
    if reader.remaining() == 0 {
        return Ok(OscMessage::new(addr));
    }

    let tags = reader.read_str()?;
    let tags = tags
        .strip_prefix(',')
        .ok_or_else(|| ControlError::OscDecode("type tag string missing ','".into()))?;

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            'i' => OscArg::Int(reader.read_i32()?),
            'f' => OscArg::Float(reader.read_f32()?),
            's' => OscArg::Str(reader.read_str()?),
            'b' => OscArg::Blob(reader.read_blob()?),
            other => return Err(ControlError::UnsupportedTypeTag(other)),
        };
        args.push(arg);
    }

    Ok(OscMessage { addr, args })
}

/// Decode a bundle (caller has verified the `#bundle` tag)
fn decode_bundle(data: &[u8]) -> Result<OscBundle> {
    let mut reader = Reader::new(data);
    reader.take(BUNDLE_TAG.len())?;
    let timetag = reader.read_u64()?;

    let mut elements = Vec::new();
    while reader.remaining() > 0 {
        let size = reader.read_i32()?;
        if size < 0 {
            return Err(ControlError::OscDecode("negative element size".into()));
        }
        let element = reader.take(size as usize)?;
        // Nested bundles are not produced by any peer we talk to; flatten
        // them anyway rather than rejecting the packet.
        match decode(element)? {
            OscPacket::Message(msg) => elements.push(msg),
            OscPacket::Bundle(inner) => elements.extend(inner.elements),
        }
    }

    Ok(OscBundle { timetag, elements })
}

/// Decode a raw packet (message or bundle)
pub fn decode(data: &[u8]) -> Result<OscPacket> {
    if data.is_empty() {
        return Err(ControlError::OscDecode("empty packet".into()));
    }
    if data.starts_with(BUNDLE_TAG) {
        Ok(OscPacket::Bundle(decode_bundle(data)?))
    } else if data[0] == b'/' {
        Ok(OscPacket::Message(decode_message(data)?))
    } else {
        Err(ControlError::OscDecode(format!(
            "unrecognised packet leader 0x{:02X}",
            data[0]
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_layout() {
        let msg = OscMessage::with_args("/test", vec![OscArg::Int(42)]);
        let mut out = Vec::new();
        encode_message(&msg, &mut out);

        // "/test" + null + 2 pad = 8 bytes
        assert_eq!(&out[0..5], b"/test");
        assert_eq!(&out[5..8], &[0, 0, 0]);
        // ",i" + null + pad = 4 bytes
        assert_eq!(&out[8..10], b",i");
        assert_eq!(&out[10..12], &[0, 0]);
        // int32 big-endian
        assert_eq!(&out[12..16], &42i32.to_be_bytes());
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn test_string_padding_boundary() {
        // 3-char address pads to 4, 4-char to 8 (terminator needs its own pad group)
        let mut out = Vec::new();
        write_padded_str(&mut out, "/ab");
        assert_eq!(out.len(), 4);

        out.clear();
        write_padded_str(&mut out, "/abc");
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_roundtrip_all_types() {
        let msg = OscMessage::with_args(
            "/soundflow/test",
            vec![
                OscArg::Int(-7),
                OscArg::Float(3.25),
                OscArg::Str("hello".into()),
                OscArg::Blob(vec![1, 2, 3, 4, 5]),
            ],
        );
        let encoded = encode(&OscPacket::Message(msg.clone()));
        assert_eq!(encoded.len() % 4, 0);

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, OscPacket::Message(msg));
    }

    #[test]
    fn test_float_is_big_endian() {
        let msg = OscMessage::with_args("/f", vec![OscArg::Float(1.0)]);
        let encoded = encode(&OscPacket::Message(msg));
        // 1.0f32 = 0x3F800000
        let arg = &encoded[encoded.len() - 4..];
        assert_eq!(arg, &[0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_bundle_roundtrip() {
        let bundle = OscBundle::immediate(vec![
            OscMessage::with_args("/a", vec![OscArg::Float(0.5)]),
            OscMessage::new("/b/c"),
        ]);
        let encoded = encode(&OscPacket::Bundle(bundle.clone()));

        assert_eq!(&encoded[0..8], b"#bundle\0");
        // Immediate timetag
        assert_eq!(&encoded[8..16], &1u64.to_be_bytes());

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, OscPacket::Bundle(bundle));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(&[]).is_err());
        assert!(decode(b"xyz").is_err());
        assert!(decode(b"/unterminated").is_err());
    }

    #[test]
    fn test_decode_truncated_argument() {
        let msg = OscMessage::with_args("/x", vec![OscArg::Int(1)]);
        let encoded = encode(&OscPacket::Message(msg));
        // Chop off the argument bytes
        let result = decode(&encoded[..encoded.len() - 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_blob_padding() {
        let msg = OscMessage::with_args("/b", vec![OscArg::Blob(vec![0xAA; 3])]);
        let encoded = encode(&OscPacket::Message(msg));
        assert_eq!(encoded.len() % 4, 0);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(
            decoded,
            OscPacket::Message(OscMessage::with_args(
                "/b",
                vec![OscArg::Blob(vec![0xAA; 3])]
            ))
        );
    }
}

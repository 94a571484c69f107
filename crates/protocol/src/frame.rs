//! WebSocket frame encoding and decoding.
//!
//! Server frames are never masked. Client frames may be masked and are
//! unmasked on decode. Lengths use the three-tier form: inline (< 126),
//! 16-bit big-endian (126) or 64-bit big-endian (127).
//!
//! The FIN bit is recorded but fragmented messages are not reassembled:
//! every text frame is handed out as one complete message and continuation
//! frames are left to the caller to ignore.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Frame opcodes understood by the server.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(ProtocolError::InvalidOpcode(other)),
        }
    }
}

/// A decoded frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Frame {
    /// Interpret the payload as UTF-8 text.
    pub fn text(&self) -> Result<&str, ProtocolError> {
        Ok(std::str::from_utf8(&self.payload)?)
    }
}

/// XOR `data` in place with the 4-byte masking key.
///
/// Applying the same key twice restores the original bytes.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` without consuming anything when the buffer does not yet
/// hold a complete frame. A declared payload length above `max_payload` is
/// rejected before any payload is read.
pub fn decode(buf: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>, ProtocolError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let first = buf[0];
    let second = buf[1];
    let fin = first & 0x80 != 0;
    let opcode = Opcode::try_from(first & 0x0F)?;
    let masked = second & 0x80 != 0;

    let (len, mut header_len) = match second & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(raw), 10)
        }
        inline => (inline as u64, 2),
    };

    if len > max_payload as u64 {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: max_payload,
        });
    }
    let len = len as usize;

    let mask = if masked {
        if buf.len() < header_len + 4 {
            return Ok(None);
        }
        let key = [
            buf[header_len],
            buf[header_len + 1],
            buf[header_len + 2],
            buf[header_len + 3],
        ];
        header_len += 4;
        Some(key)
    } else {
        None
    };

    if buf.len() < header_len + len {
        return Ok(None);
    }

    buf.advance(header_len);
    let mut payload = buf.split_to(len);
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some(Frame {
        fin,
        opcode,
        payload: payload.freeze(),
    }))
}

fn put_header(buf: &mut BytesMut, opcode: Opcode, len: usize, masked: bool) {
    let mask_bit = if masked { 0x80 } else { 0x00 };
    buf.put_u8(0x80 | opcode as u8);
    if len < 126 {
        buf.put_u8(mask_bit | len as u8);
    } else if len < 65536 {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(len as u64);
    }
}

/// Encode a single unmasked, final frame.
pub fn encode(opcode: Opcode, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 10);
    put_header(&mut buf, opcode, payload.len(), false);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encode a masked frame, as a browser client would send it.
pub fn encode_masked(opcode: Opcode, payload: &[u8], key: [u8; 4]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 14);
    put_header(&mut buf, opcode, payload.len(), true);
    buf.put_slice(&key);
    let start = buf.len();
    buf.put_slice(payload);
    apply_mask(&mut buf[start..], key);
    buf.freeze()
}

/// Encode a text frame.
#[inline]
pub fn encode_text(text: &str) -> Bytes {
    encode(Opcode::Text, text.as_bytes())
}

/// Empty ping control frame.
#[inline]
pub fn ping() -> Bytes {
    encode(Opcode::Ping, &[])
}

/// Pong control frame echoing the ping payload.
#[inline]
pub fn pong(payload: &[u8]) -> Bytes {
    encode(Opcode::Pong, payload)
}

/// Empty close control frame.
#[inline]
pub fn close() -> Bytes {
    encode(Opcode::Close, &[])
}

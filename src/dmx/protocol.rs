//! Art-Net DMX wire format
//!
//! | offset | size | field    | encoding                 |
//! |--------|------|----------|--------------------------|
//! | 0      | 8    | magic    | `"Art-Net\0"`            |
//! | 8      | 2    | opcode   | little-endian, `0x5000`  |
//! | 10     | 2    | version  | big-endian, 14           |
//! | 12     | 1    | sequence | 0 = unsequenced          |
//! | 13     | 1    | physical | input port               |
//! | 14     | 2    | universe | little-endian            |
//! | 16     | 2    | length   | big-endian, usually 512  |
//! | 18     | n    | channels | one byte per channel     |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::DMX_CHANNELS;
use crate::error::TransportError;

/// Protocol magic, NUL-terminated
pub const ARTNET_ID: &[u8; 8] = b"Art-Net\0";

/// ArtDmx opcode
pub const OP_DMX: u16 = 0x5000;

/// Protocol revision carried in every frame
pub const PROTOCOL_VERSION: u16 = 14;

/// Bytes before the channel payload
pub const HEADER_LEN: usize = 18;

/// Full frame size with a 512-channel payload
pub const FRAME_LEN: usize = HEADER_LEN + DMX_CHANNELS;

/// One universe of channel values, addressed 1..=512
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelTable {
    values: [u8; DMX_CHANNELS],
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChannelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.values.iter().filter(|v| **v != 0).count();
        f.debug_struct("ChannelTable").field("active", &active).finish()
    }
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            values: [0; DMX_CHANNELS],
        }
    }

    /// Set channel `number` (1-based). Out-of-range numbers are ignored.
    pub fn set(&mut self, number: u16, value: u8) {
        if let Some(slot) = (number as usize)
            .checked_sub(1)
            .and_then(|i| self.values.get_mut(i))
        {
            *slot = value;
        }
    }

    /// Channel `number` (1-based); 0 when out of range.
    pub fn get(&self, number: u16) -> u8 {
        (number as usize)
            .checked_sub(1)
            .and_then(|i| self.values.get(i))
            .copied()
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.values = [0; DMX_CHANNELS];
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }
}

/// Per-frame addressing fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// 0 disables receiver-side reordering
    pub sequence: u8,
    pub physical: u8,
    pub universe: u16,
}

/// A parsed ArtDmx frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmxFrame {
    pub header: FrameHeader,
    pub data: Bytes,
}

/// Reusable frame builder; encodes without reallocating after the first frame
pub struct FrameEncoder {
    buffer: BytesMut,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(FRAME_LEN),
        }
    }

    /// Encode `table` into a frame borrowed from the internal buffer
    pub fn encode(&mut self, header: FrameHeader, table: &ChannelTable) -> &[u8] {
        self.buffer.clear();
        write_frame(&mut self.buffer, header, table.as_slice());
        &self.buffer[..]
    }
}

fn write_frame(buf: &mut BytesMut, header: FrameHeader, data: &[u8]) {
    buf.reserve(HEADER_LEN + data.len());
    buf.put_slice(ARTNET_ID);
    buf.put_u16_le(OP_DMX);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u8(header.sequence);
    buf.put_u8(header.physical);
    buf.put_u16_le(header.universe);
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
}

/// Encode a standalone frame
pub fn encode_frame(header: FrameHeader, table: &ChannelTable) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_LEN);
    write_frame(&mut buf, header, table.as_slice());
    buf.freeze()
}

/// Parse an ArtDmx frame
pub fn decode_frame(frame: &[u8]) -> Result<DmxFrame, TransportError> {
    if frame.len() < HEADER_LEN {
        return Err(TransportError::InvalidFrame(format!(
            "{} bytes is shorter than the header",
            frame.len()
        )));
    }

    let mut buf = frame;
    if &buf[..ARTNET_ID.len()] != ARTNET_ID {
        return Err(TransportError::InvalidFrame("bad magic".to_string()));
    }
    buf.advance(ARTNET_ID.len());

    let opcode = buf.get_u16_le();
    if opcode != OP_DMX {
        return Err(TransportError::InvalidFrame(format!("opcode {:#06x}", opcode)));
    }
    let version = buf.get_u16();
    if version < PROTOCOL_VERSION {
        return Err(TransportError::InvalidFrame(format!("protocol version {}", version)));
    }

    let header = FrameHeader {
        sequence: buf.get_u8(),
        physical: buf.get_u8(),
        universe: buf.get_u16_le(),
    };
    let length = buf.get_u16() as usize;
    if length > DMX_CHANNELS || buf.remaining() < length {
        return Err(TransportError::InvalidFrame(format!(
            "length {} with {} payload bytes",
            length,
            buf.remaining()
        )));
    }

    Ok(DmxFrame {
        header,
        data: Bytes::copy_from_slice(&buf[..length]),
    })
}

//! TLV item codec for the frame payload.
//!
//! A frame's payload is a sequence of items: a 1-byte tag, a 2-byte
//! big-endian length, and that many bytes of data. This module parses that
//! sequence into an [`ItemSet`] and encodes one back out.

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Recognized item tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// Operation code item.
    Opcode = 0x01,
    /// Request/response payload item.
    Payload = 0x02,
    /// Key identifier item.
    KeyId = 0x03,
    /// Error code item.
    Error = 0xFF,
}

/// Length in bytes of a SHA-256 digest used as a `KEY_ID`.
pub const KEY_ID_LEN: usize = 32;

const ITEM_HEADER_LEN: usize = 1 + 2;

/// The decoded items of a frame payload.
///
/// Unrecognized tags are ignored, matching the source protocol's tolerance
/// for forward-compatible extension items. Duplicate recognized tags keep
/// the last occurrence (see DESIGN.md).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSet {
    /// Decoded `OPCODE` item, if present.
    pub opcode: Option<u8>,
    /// Decoded `PAYLOAD` item, if present.
    pub payload: Option<Bytes>,
    /// Decoded `KEY_ID` item, if present.
    pub key_id: Option<Bytes>,
    /// Decoded `ERROR` item, if present.
    pub error: Option<u8>,
}

impl ItemSet {
    /// Parse a sequence of items out of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Format`] if an item's declared length
    /// overruns the remaining bytes, or if a 1-byte item (`OPCODE`/`ERROR`)
    /// declares a length other than 1.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut set = Self::default();
        let mut cursor = 0usize;

        while cursor < bytes.len() {
            if bytes.len() - cursor < ITEM_HEADER_LEN {
                return Err(ProtocolError::Format);
            }
            let tag = bytes[cursor];
            let len = u16::from_be_bytes([bytes[cursor + 1], bytes[cursor + 2]]) as usize;
            let data_start = cursor + ITEM_HEADER_LEN;
            let data_end = data_start.checked_add(len).ok_or(ProtocolError::Format)?;
            if data_end > bytes.len() {
                return Err(ProtocolError::Format);
            }
            let data = &bytes[data_start..data_end];

            match tag {
                t if t == Tag::Opcode as u8 => {
                    set.opcode = Some(single_byte(data)?);
                },
                t if t == Tag::Payload as u8 => {
                    set.payload = Some(Bytes::copy_from_slice(data));
                },
                t if t == Tag::KeyId as u8 => {
                    set.key_id = Some(Bytes::copy_from_slice(data));
                },
                t if t == Tag::Error as u8 => {
                    set.error = Some(single_byte(data)?);
                },
                _ => {},
            }

            cursor = data_end;
        }

        Ok(set)
    }

    /// Encode a request/response item set into a payload byte buffer.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        if let Some(opcode) = self.opcode {
            put_item(&mut buf, Tag::Opcode, &[opcode]);
        }
        if let Some(key_id) = &self.key_id {
            put_item(&mut buf, Tag::KeyId, key_id);
        }
        if let Some(payload) = &self.payload {
            put_item(&mut buf, Tag::Payload, payload);
        }
        if let Some(error) = self.error {
            put_item(&mut buf, Tag::Error, &[error]);
        }
        buf.freeze()
    }
}

fn single_byte(data: &[u8]) -> Result<u8> {
    match data {
        [byte] => Ok(*byte),
        _ => Err(ProtocolError::Format),
    }
}

fn put_item(buf: &mut BytesMut, tag: Tag, data: &[u8]) {
    buf.put_u8(tag as u8);
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
}

//! Frame type combining header and item payload.
//!
//! A `Frame` is the transport-layer packet: an 8-byte header (see
//! [`FrameHeader`]) followed by a variable-length sequence of items (see
//! [`ItemSet`]). This is a pure data holder; encoding/decoding is structural
//! only and does not know about opcodes or keys.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    FrameHeader, ItemSet,
    errors::{ProtocolError, Result},
};

/// A complete protocol frame: header plus its decoded items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Fixed-size frame header.
    pub header: FrameHeader,
    /// Decoded items carried by the frame.
    pub items: ItemSet,
}

impl Frame {
    /// Build a frame from an item set, computing the header's declared
    /// length from the encoded item bytes.
    #[must_use]
    pub fn new(id: u32, items: ItemSet) -> Self {
        let encoded_len = items.encode().len();
        let header = FrameHeader::new(encoded_len as u16, id);
        Self { header, items }
    }

    /// Encode this frame to its wire representation.
    pub fn encode(&self) -> Bytes {
        let body = self.items.encode();
        let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + body.len());
        buf.put_slice(&self.header.to_bytes());
        buf.put_slice(&body);
        buf.freeze()
    }

    /// Decode a complete frame (header + exactly `header.length()` payload
    /// bytes) from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Format`] if `bytes` is shorter than the
    /// header, or if the payload does not decode cleanly as items.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::decode(bytes)?;
        let payload_end = FrameHeader::SIZE + header.length() as usize;
        let payload = bytes.get(FrameHeader::SIZE..payload_end).ok_or(ProtocolError::Format)?;
        let items = ItemSet::decode(payload)?;
        Ok(Self { header, items })
    }
}

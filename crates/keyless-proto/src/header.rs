//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 8-byte structure serialized as raw binary
//! (network byte order for the multi-byte fields). Zero-copy parsing lets the
//! connection read loop stage bytes directly off the wire without an
//! intermediate allocation per header.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 8-byte frame header (network byte order).
///
/// # Security
///
/// The `#[repr(C, packed)]` layout with zerocopy traits ensures this struct
/// can be safely cast from untrusted network bytes: every 8-byte pattern is a
/// valid `FrameHeader`, so parsing cannot produce undefined behavior. Version
/// and length validation happen separately, after the cast.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    version_major: u8,
    version_minor: u8,
    length: [u8; 2],
    id: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 8;

    /// The major version this implementation speaks and expects of peers.
    pub const SUPPORTED_VERSION_MAJOR: u8 = 1;

    /// Build a header for a frame with the given payload length and
    /// correlation id, stamped with the version this implementation speaks.
    #[must_use]
    pub fn new(length: u16, id: u32) -> Self {
        Self {
            version_major: Self::SUPPORTED_VERSION_MAJOR,
            version_minor: 0,
            length: length.to_be_bytes(),
            id: id.to_be_bytes(),
        }
    }

    /// Parse a header from exactly [`FrameHeader::SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Format`] if `bytes` is shorter than
    /// [`FrameHeader::SIZE`]. The version is deliberately not validated here;
    /// that is the connection state machine's job (it needs the request `id`
    /// from this same header to answer a mismatch).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::read_from_prefix(bytes)
            .map(|(header, _rest)| header)
            .map_err(|_| ProtocolError::Format)
    }

    /// Serialize this header to its wire representation.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        self.as_bytes().try_into().unwrap_or_else(|_| unreachable!("FrameHeader is SIZE bytes"))
    }

    /// Major version declared by the peer.
    #[must_use]
    pub fn version_major(&self) -> u8 {
        self.version_major
    }

    /// Minor version declared by the peer.
    #[must_use]
    pub fn version_minor(&self) -> u8 {
        self.version_minor
    }

    /// Declared payload length in bytes.
    #[must_use]
    pub fn length(&self) -> u16 {
        u16::from_be_bytes(self.length)
    }

    /// Opaque correlation id chosen by the client and echoed by the server.
    #[must_use]
    pub fn id(&self) -> u32 {
        u32::from_be_bytes(self.id)
    }

    /// True if `version_major` matches the version this implementation
    /// speaks.
    #[must_use]
    pub fn is_supported_version(&self) -> bool {
        self.version_major == Self::SUPPORTED_VERSION_MAJOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_stamps_supported_version() {
        let header = FrameHeader::new(7, 0xDEAD_BEEF);
        assert_eq!(header.version_major(), FrameHeader::SUPPORTED_VERSION_MAJOR);
        assert_eq!(header.version_minor(), 0);
        assert_eq!(header.length(), 7);
        assert_eq!(header.id(), 0xDEAD_BEEF);
    }

    #[test]
    fn round_trip_preserves_fields() {
        let header = FrameHeader::new(42, 7);
        let bytes = header.to_bytes();
        let decoded = FrameHeader::decode(&bytes).expect("decode should succeed");
        assert_eq!(decoded, header);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let short = [0u8; 4];
        assert!(matches!(FrameHeader::decode(&short), Err(ProtocolError::Format)));
    }

    #[test]
    fn mismatched_version_is_detected() {
        let mut bytes = FrameHeader::new(0, 1).to_bytes();
        bytes[0] = 9;
        let header = FrameHeader::decode(&bytes).expect("decode should succeed");
        assert!(!header.is_supported_version());
        assert_eq!(header.id(), 1);
    }
}

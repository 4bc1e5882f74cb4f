//! Connection state machine: the per-connection header → payload
//! staging, request dispatch, and response encoding logic.
//!
//! This module is intentionally Sans-IO: it never touches a socket. Given
//! bytes that have already been read off the wire, it decides what to do
//! next and hands back encoded response bytes. The actual buffered
//! read/write loop against a TLS stream lives in the server crate, which
//! drives these pure functions with real I/O.

use std::sync::Arc;

use bytes::Bytes;
use keyless_proto::{Frame, FrameHeader, ItemSet, Opcode};

use crate::{dispatch, error::ErrorCode, keystore::Keystore};

/// What the connection task should do after a header has been decoded.
#[derive(Debug)]
pub enum HeaderDecision {
    /// The header's version is supported. Read exactly `length` more bytes
    /// as the payload, then call [`ConnectionEngine::handle_request`].
    Dispatch {
        /// Declared payload length to read before dispatching.
        length: u16,
    },

    /// The header's `version_major` did not match. The caller has already
    /// been handed the encoded `VERSION_MISMATCH` response to send; it must
    /// additionally read and discard exactly `discard_len` bytes (the
    /// offending header's declared payload) before returning to
    /// NEED_HEADER, discarding exactly the declared payload length to
    /// resynchronize to the next frame boundary.
    VersionMismatch {
        /// Number of payload bytes the caller must read and discard.
        discard_len: u16,
        /// Encoded `VERSION_MISMATCH` response frame to send.
        response: Bytes,
    },
}

/// Pure dispatch logic shared by every connection on this server.
///
/// Cheap to clone (an `Arc` around the keystore): one instance is shared
/// across every accepted connection.
#[derive(Clone)]
pub struct ConnectionEngine {
    keystore: Arc<Keystore>,
}

impl ConnectionEngine {
    /// Build an engine backed by the given keystore.
    #[must_use]
    pub fn new(keystore: Arc<Keystore>) -> Self {
        Self { keystore }
    }

    /// Decode a just-read 8-byte header and decide what the connection task
    /// should do next.
    pub fn handle_header(&self, header_bytes: &[u8]) -> Result<HeaderDecision, Bytes> {
        let header = match FrameHeader::decode(header_bytes) {
            Ok(header) => header,
            Err(_) => {
                // Too short to have even an id to echo; this can only
                // happen if the caller mis-sized the read, which is a bug
                // in the I/O layer, not a wire condition. Treated as a
                // zero-id FORMAT response for robustness.
                return Err(encode_error(0, ErrorCode::Format));
            },
        };

        if !header.is_supported_version() {
            let response = encode_error(header.id(), ErrorCode::VersionMismatch);
            return Ok(HeaderDecision::VersionMismatch { discard_len: header.length(), response });
        }

        Ok(HeaderDecision::Dispatch { length: header.length() })
    }

    /// Decode the payload items, run the crypto dispatcher, and encode a
    /// `RESPONSE` or `ERROR` frame. Always succeeds in producing a frame:
    /// every failure mode the dispatcher can report has a wire error code.
    #[must_use]
    pub fn handle_request(&self, id: u32, payload: &[u8]) -> Bytes {
        let items = match ItemSet::decode(payload) {
            Ok(items) => items,
            Err(_) => return encode_error(id, ErrorCode::Format),
        };

        let Some(opcode_byte) = items.opcode else {
            return encode_error(id, ErrorCode::Format);
        };
        let Some(opcode) = Opcode::from_u8(opcode_byte) else {
            return encode_error(id, ErrorCode::BadOpcode);
        };

        let payload_bytes = items.payload.as_deref().unwrap_or(&[]);
        match dispatch::execute(&self.keystore, opcode, items.key_id.as_deref(), payload_bytes) {
            Ok(result) => encode_response(id, result),
            Err(err) => encode_error(id, err.to_error_code()),
        }
    }
}

fn encode_response(id: u32, payload: Vec<u8>) -> Bytes {
    let items = ItemSet {
        opcode: Some(Opcode::Response.to_u8()),
        payload: Some(Bytes::from(payload)),
        key_id: None,
        error: None,
    };
    Frame::new(id, items).encode()
}

fn encode_error(id: u32, code: ErrorCode) -> Bytes {
    let items = ItemSet {
        opcode: Some(Opcode::Error.to_u8()),
        payload: None,
        key_id: None,
        error: Some(code.to_u8()),
    };
    Frame::new(id, items).encode()
}

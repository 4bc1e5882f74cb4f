//! Error types for the keyless protocol core.
//!
//! Strongly-typed errors for each layer: the single-byte wire error code,
//! the crypto dispatcher's failure modes, and fatal connection-level errors
//! that are never themselves put on the wire.
//!
//! We avoid reusing `std::io::Error` for protocol logic to keep type safety
//! and let the connection state machine decide, per error kind, whether the
//! connection survives.

use std::io;

use thiserror::Error;

/// The single-byte error code carried in an `ERROR` item.
///
/// `None` is an internal success sentinel and is never encoded; `Internal`
/// is likewise never put on the wire (it causes the connection to
/// terminate instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    None = 0x00,
    CryptoFailed = 0x01,
    KeyNotFound = 0x02,
    Read = 0x03,
    VersionMismatch = 0x04,
    BadOpcode = 0x05,
    UnexpectedOpcode = 0x06,
    Format = 0x07,
    Internal = 0x08,
}

impl ErrorCode {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Errors from the crypto dispatcher: everything that can go wrong
/// resolving a key and executing the requested operation against it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The requested key operation failed (bad padding, malformed input, EC
    /// arithmetic failure).
    #[error("crypto operation failed")]
    CryptoFailed,

    /// `KEY_ID` did not match any loaded key.
    #[error("key not found")]
    KeyNotFound,

    /// The opcode is unknown, or incompatible with the resolved key's type.
    #[error("bad opcode")]
    BadOpcode,

    /// An opcode valid only in a response (`RESPONSE`/`ERROR`/`PONG`) was
    /// received as a request.
    #[error("unexpected opcode in request")]
    UnexpectedOpcode,

    /// The request's items were structurally inconsistent (e.g. a digest
    /// payload of the wrong length for its algorithm, or a missing
    /// required item).
    #[error("malformed request")]
    Format,
}

impl DispatchError {
    /// The wire error code this dispatch failure maps to.
    #[must_use]
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            Self::CryptoFailed => ErrorCode::CryptoFailed,
            Self::KeyNotFound => ErrorCode::KeyNotFound,
            Self::BadOpcode => ErrorCode::BadOpcode,
            Self::UnexpectedOpcode => ErrorCode::UnexpectedOpcode,
            Self::Format => ErrorCode::Format,
        }
    }
}

impl From<keyless_proto::ProtocolError> for DispatchError {
    fn from(_: keyless_proto::ProtocolError) -> Self {
        Self::Format
    }
}

/// Fatal errors that terminate a connection rather than producing an
/// `ERROR` frame. None of these are ever encoded on the wire.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The TLS session or underlying socket failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A server-side condition not attributable to the request (an outbound
    /// queue overflow being the canonical example).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConnectionError {
    /// True if the peer simply closed the connection (not a real failure).
    #[must_use]
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Transport(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_distinct_wire_codes() {
        assert_eq!(DispatchError::CryptoFailed.to_error_code(), ErrorCode::CryptoFailed);
        assert_eq!(DispatchError::KeyNotFound.to_error_code(), ErrorCode::KeyNotFound);
        assert_eq!(DispatchError::BadOpcode.to_error_code(), ErrorCode::BadOpcode);
        assert_eq!(DispatchError::UnexpectedOpcode.to_error_code(), ErrorCode::UnexpectedOpcode);
        assert_eq!(DispatchError::Format.to_error_code(), ErrorCode::Format);
    }

    #[test]
    fn eof_is_a_clean_close() {
        let err = ConnectionError::Transport(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(err.is_clean_close());
        let err = ConnectionError::Internal("queue overflow".to_string());
        assert!(!err.is_clean_close());
    }
}

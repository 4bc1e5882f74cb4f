//! Wire-level error types for the frame codec.

use thiserror::Error;

/// Errors produced while decoding a frame header or its item payload.
///
/// These never carry request-specific context (the `id` lives in the frame
/// header, not the error) because they can occur before a header has even
/// been parsed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The header or an item's declared length is inconsistent with the
    /// number of bytes actually available.
    #[error("malformed frame")]
    Format,
}

/// Result alias for fallible codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

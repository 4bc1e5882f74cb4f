//! Wire protocol for the keyless signing server: frame header, TLV item
//! payload, and operation codes.
//!
//! This crate is pure codec logic: it knows how to turn bytes into a
//! [`Frame`] and back, and nothing about keys, crypto, or I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod header;
mod item;
mod opcode;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use item::{ItemSet, KEY_ID_LEN, Tag};
pub use opcode::{DigestAlgorithm, Opcode};

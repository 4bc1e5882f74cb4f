//! Protocol-agnostic core: keystore, crypto dispatch, and the per-connection
//! state machine. No networking lives here — see `keyless-server` for the
//! TLS transport and process-level concerns that drive this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod dispatch;
mod env;
mod error;
mod keystore;

pub use connection::{ConnectionEngine, HeaderDecision};
pub use env::Environment;
pub use error::{ConnectionError, DispatchError, ErrorCode};
pub use keystore::{KeyMaterial, KeyRecord, Keystore, KeystoreError};

/// Runs the crypto dispatcher directly, bypassing the connection/frame
/// layer. Exposed for callers (tests, tooling) that already have a decoded
/// opcode and don't need the wire format.
pub use dispatch::execute;

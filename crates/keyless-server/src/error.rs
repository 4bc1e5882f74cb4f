//! Server error types.
//!
//! Bootstrap errors (bad config, unreadable keys, bind failure) are fatal
//! and terminate the process; transport errors terminate one connection.
//! Neither is ever put on the wire — wire-facing errors live in
//! [`keyless_core::ErrorCode`].

use thiserror::Error;

/// Errors that can occur while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, missing TLS certs, bad
    /// cipher list, etc.). Fatal — fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to load the key directory into a keystore.
    #[error("keystore error: {0}")]
    Keystore(#[source] keyless_core::KeystoreError),

    /// Transport/network error (bind failure, TLS context construction,
    /// I/O error).
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<keyless_core::KeystoreError> for ServerError {
    fn from(err: keyless_core::KeystoreError) -> Self {
        Self::Keystore(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::Config("missing --port".to_string());
        assert_eq!(err.to_string(), "configuration error: missing --port");
    }
}

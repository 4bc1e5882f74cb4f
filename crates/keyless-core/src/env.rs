//! Environment abstraction for randomness.
//!
//! Decouples the connection-id minting done by the server crate from the
//! concrete randomness source, so tests can supply a fixed source without
//! touching the OS RNG.
//!
//! # Safety
//!
//! Implementations MUST guarantee `random_bytes()` uses cryptographically
//! secure entropy in production.
/// Source of randomness injected into connection handling.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// This is a convenience method for common use cases like generating
    /// connection ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

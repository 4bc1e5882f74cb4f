//! Production `Environment` implementation using system RNG.
//!
//! Used only to mint per-connection identifiers for log correlation; no
//! protocol logic depends on randomness.

use keyless_core::Environment;

/// Production environment using the OS's cryptographic RNG.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails. A server unable to source
/// cryptographic randomness cannot safely mint connection identifiers.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - server cannot operate securely");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_random_bytes_differ() {
        let env = SystemEnv::new();
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        env.random_bytes(&mut a);
        env.random_bytes(&mut b);
        assert_ne!(a, b);
    }
}

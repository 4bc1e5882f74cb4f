//! Keystore: maps a SHA-256 digest of a key's public material to the
//! loaded private key handle.
//!
//! Populated once at startup from a directory of `.key` PEM files and never
//! mutated afterwards, so lookups are safe to call concurrently from any
//! connection task without locking.

use std::{fmt, fs, path::Path};

use p256::ecdsa::SigningKey as P256SigningKey;
use pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, pkcs1::DecodeRsaPrivateKey};
use sec1::DecodeEcPrivateKey;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A loaded private key, tagged by the algorithm family it belongs to.
///
/// Only RSA and P-256 ECDSA are supported; see DESIGN.md for why the key
/// space was scoped this way.
pub enum KeyMaterial {
    Rsa(RsaPrivateKey),
    EcdsaP256(P256SigningKey),
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(_) => write!(f, "KeyMaterial::Rsa(..)"),
            Self::EcdsaP256(_) => write!(f, "KeyMaterial::EcdsaP256(..)"),
        }
    }
}

impl KeyMaterial {
    /// SHA-256 over the DER `SubjectPublicKeyInfo` of this key's public
    /// half. This is the digest clients address keys by as `KEY_ID`.
    fn digest(&self) -> Result<[u8; 32], KeystoreError> {
        let der = match self {
            Self::Rsa(key) => key
                .to_public_key()
                .to_public_key_der()
                .map_err(|e| KeystoreError::Encode(e.to_string()))?,
            Self::EcdsaP256(key) => key
                .verifying_key()
                .to_public_key_der()
                .map_err(|e| KeystoreError::Encode(e.to_string()))?,
        };
        Ok(Sha256::digest(der.as_bytes()).into())
    }
}

/// A single loaded key, addressable by its public-material digest.
#[derive(Debug)]
pub struct KeyRecord {
    /// SHA-256 digest of the key's public material (the `KEY_ID`).
    pub digest: [u8; 32],
    /// The loaded private key handle.
    pub material: KeyMaterial,
}

/// Errors that can occur while building a keystore at startup.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("failed to read key directory: {0}")]
    Directory(#[source] std::io::Error),

    #[error("failed to read key file {path}: {source}")]
    ReadFile { path: String, #[source] source: std::io::Error },

    #[error("{path} is not a recognized PEM private key: {reason}")]
    UnrecognizedKey { path: String, reason: String },

    #[error("failed to DER-encode a loaded key's public half: {0}")]
    Encode(String),

    #[error("no .key files found in key directory")]
    Empty,
}

/// Read-only, flat-list keystore: `lookup` by digest, fully populated before
/// any connection is accepted.
#[derive(Debug)]
pub struct Keystore {
    records: Vec<KeyRecord>,
}

impl Keystore {
    /// Load every `*.key` PEM file directly inside `directory`, computing
    /// each one's public-material digest.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::Empty`] if the directory contains no `.key`
    /// files: zero keys is a fatal startup error.
    pub fn load_dir(directory: &Path) -> Result<Self, KeystoreError> {
        let entries = fs::read_dir(directory).map_err(KeystoreError::Directory)?;
        let mut records = Vec::new();

        for entry in entries {
            let entry = entry.map_err(KeystoreError::Directory)?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("key") {
                continue;
            }

            let pem = fs::read_to_string(&path).map_err(|source| KeystoreError::ReadFile {
                path: path.display().to_string(),
                source,
            })?;

            let material = parse_key_pem(&pem).map_err(|reason| KeystoreError::UnrecognizedKey {
                path: path.display().to_string(),
                reason,
            })?;
            let digest = material.digest()?;
            records.push(KeyRecord { digest, material });
        }

        if records.is_empty() {
            return Err(KeystoreError::Empty);
        }

        Ok(Self { records })
    }

    /// Build a keystore directly from already-loaded records (used by
    /// tests, which construct keys in memory instead of from a directory).
    #[must_use]
    pub fn from_records(records: Vec<KeyRecord>) -> Self {
        Self { records }
    }

    /// Resolve a `KEY_ID` digest to its key material. Linear scan: the
    /// expected key count is in the tens to low hundreds.
    #[must_use]
    pub fn lookup(&self, digest: &[u8]) -> Option<&KeyMaterial> {
        self.records.iter().find(|record| record.digest == digest).map(|record| &record.material)
    }

    /// Number of loaded keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn parse_key_pem(pem: &str) -> Result<KeyMaterial, String> {
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(KeyMaterial::Rsa(key));
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(KeyMaterial::Rsa(key));
    }
    if let Ok(key) = P256SigningKey::from_pkcs8_pem(pem) {
        return Ok(KeyMaterial::EcdsaP256(key));
    }
    if let Ok(key) = P256SigningKey::from_sec1_pem(pem) {
        return Ok(KeyMaterial::EcdsaP256(key));
    }
    Err("not a recognized RSA (PKCS#1/PKCS#8) or P-256 EC (SEC1/PKCS#8) private key".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rsa_key() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 2048).expect("key generation should succeed")
    }

    #[test]
    fn lookup_finds_loaded_key_by_digest() {
        let key = test_rsa_key();
        let material = KeyMaterial::Rsa(key);
        let digest = material.digest().expect("digest should succeed");
        let keystore = Keystore::from_records(vec![KeyRecord { digest, material }]);

        assert!(keystore.lookup(&digest).is_some());
    }

    #[test]
    fn lookup_of_unknown_digest_is_none() {
        let key = test_rsa_key();
        let material = KeyMaterial::Rsa(key);
        let digest = material.digest().expect("digest should succeed");
        let keystore = Keystore::from_records(vec![KeyRecord { digest, material }]);

        assert!(keystore.lookup(&[0u8; 32]).is_none());
    }

    #[test]
    fn load_dir_rejects_empty_directory() {
        let dir = tempfile::tempdir().expect("tempdir should succeed");
        let err = Keystore::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, KeystoreError::Empty));
    }

    #[test]
    fn load_dir_ignores_non_key_extensions() {
        let dir = tempfile::tempdir().expect("tempdir should succeed");
        fs::write(dir.path().join("readme.txt"), "not a key").unwrap();
        let err = Keystore::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, KeystoreError::Empty));
    }
}

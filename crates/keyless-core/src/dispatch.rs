//! Crypto dispatcher: executes the requested operation against a
//! resolved key handle.
//!
//! Pure with respect to the keystore: no mutation, and no I/O beyond the
//! crypto primitives themselves.

use ecdsa::signature::hazmat::PrehashSigner;
use num_bigint_dig::BigUint;
use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey};
use rsa::{
    Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey,
    traits::{PrivateKeyParts, PublicKeyParts},
};

use crate::{
    error::DispatchError,
    keystore::{KeyMaterial, Keystore},
};
use keyless_proto::{DigestAlgorithm, Opcode};

/// Execute `opcode` against `key_id`'s key (or, for `PING`, against no key
/// at all) and return the result payload bytes.
///
/// # Errors
///
/// See [`DispatchError`] for the mapping to wire error codes.
pub fn execute(
    keystore: &Keystore,
    opcode: Opcode,
    key_id: Option<&[u8]>,
    payload: &[u8],
) -> Result<Vec<u8>, DispatchError> {
    if opcode.is_response_only() {
        return Err(DispatchError::UnexpectedOpcode);
    }

    if opcode == Opcode::Ping {
        return Ok(payload.to_vec());
    }

    let digest = key_id.ok_or(DispatchError::Format)?;
    let key = keystore.lookup(digest).ok_or(DispatchError::KeyNotFound)?;

    match (opcode, key) {
        (Opcode::RsaDecrypt, KeyMaterial::Rsa(rsa_key)) => rsa_decrypt(rsa_key, payload),
        (Opcode::RsaDecryptRaw, KeyMaterial::Rsa(rsa_key)) => rsa_decrypt_raw(rsa_key, payload),
        (Opcode::RsaSign(digest_alg), KeyMaterial::Rsa(rsa_key)) => {
            rsa_sign(rsa_key, digest_alg, payload)
        },
        (Opcode::EcdsaSign(digest_alg), KeyMaterial::EcdsaP256(ec_key)) => {
            ecdsa_sign_p256(ec_key, digest_alg, payload)
        },
        _ => Err(DispatchError::BadOpcode),
    }
}

fn rsa_decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, DispatchError> {
    key.decrypt(Pkcs1v15Encrypt, ciphertext).map_err(|_| DispatchError::CryptoFailed)
}

/// Raw (unpadded) RSA private-key operation: `c^d mod n`, output left-padded
/// to the modulus size. No PKCS#1 unpadding is applied.
fn rsa_decrypt_raw(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, DispatchError> {
    let modulus_len = key.size();
    if ciphertext.len() != modulus_len {
        return Err(DispatchError::CryptoFailed);
    }

    let c = BigUint::from_bytes_be(ciphertext);
    if c >= *key.n() {
        return Err(DispatchError::CryptoFailed);
    }

    let m = c.modpow(key.d(), key.n());
    let out = m.to_bytes_be();
    if out.len() > modulus_len {
        return Err(DispatchError::CryptoFailed);
    }
    let mut padded = vec![0u8; modulus_len];
    padded[modulus_len - out.len()..].copy_from_slice(&out);
    Ok(padded)
}

fn rsa_sign(
    key: &RsaPrivateKey,
    digest_alg: DigestAlgorithm,
    digest: &[u8],
) -> Result<Vec<u8>, DispatchError> {
    if digest.len() != digest_alg.digest_len() {
        return Err(DispatchError::Format);
    }

    let padding = match digest_alg {
        DigestAlgorithm::Md5Sha1 => Pkcs1v15Sign::new_unprefixed(),
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        DigestAlgorithm::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
    };

    key.sign(padding, digest).map_err(|_| DispatchError::CryptoFailed)
}

fn ecdsa_sign_p256(
    key: &P256SigningKey,
    digest_alg: DigestAlgorithm,
    digest: &[u8],
) -> Result<Vec<u8>, DispatchError> {
    if digest.len() != digest_alg.digest_len() {
        return Err(DispatchError::Format);
    }

    let signature: P256Signature =
        key.sign_prehash(digest).map_err(|_| DispatchError::CryptoFailed)?;
    Ok(signature.to_der().as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::KeyRecord;
    use sha2::{Digest as _, Sha256};

    fn keystore_with_rsa_key() -> (Keystore, [u8; 32], RsaPrivateKey) {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation should succeed");
        let material = KeyMaterial::Rsa(key.clone());
        let digest: [u8; 32] = {
            use pkcs8::EncodePublicKey;
            let der = key.to_public_key().to_public_key_der().unwrap();
            Sha256::digest(der.as_bytes()).into()
        };
        (Keystore::from_records(vec![KeyRecord { digest, material }]), digest, key)
    }

    #[test]
    fn ping_echoes_payload_without_a_key() {
        let (keystore, _, _) = keystore_with_rsa_key();
        let result = execute(&keystore, Opcode::Ping, None, b"abcdef\0").unwrap();
        assert_eq!(result, b"abcdef\0");
    }

    #[test]
    fn response_only_opcodes_are_rejected_as_requests() {
        let (keystore, _, _) = keystore_with_rsa_key();
        let err = execute(&keystore, Opcode::Response, None, b"").unwrap_err();
        assert_eq!(err, DispatchError::UnexpectedOpcode);
    }

    #[test]
    fn unknown_key_id_is_key_not_found() {
        let (keystore, _, _) = keystore_with_rsa_key();
        let err = execute(
            &keystore,
            Opcode::RsaSign(DigestAlgorithm::Sha256),
            Some(&[0u8; 32]),
            &[0u8; 32],
        )
        .unwrap_err();
        assert_eq!(err, DispatchError::KeyNotFound);
    }

    #[test]
    fn wrong_key_type_is_bad_opcode() {
        let (keystore, digest, _) = keystore_with_rsa_key();
        let err = execute(
            &keystore,
            Opcode::EcdsaSign(DigestAlgorithm::Sha256),
            Some(&digest),
            &[0u8; 32],
        )
        .unwrap_err();
        assert_eq!(err, DispatchError::BadOpcode);
    }

    #[test]
    fn rsa_sign_sha256_produces_verifiable_signature() {
        let (keystore, digest, key) = keystore_with_rsa_key();
        let message_digest = Sha256::digest(b"hello world");
        let signature = execute(
            &keystore,
            Opcode::RsaSign(DigestAlgorithm::Sha256),
            Some(&digest),
            &message_digest,
        )
        .unwrap();

        assert_eq!(signature.len(), key.size());
        let padding = Pkcs1v15Sign::new::<sha2::Sha256>();
        key.to_public_key().verify(padding, &message_digest, &signature).unwrap();
    }

    #[test]
    fn rsa_sign_rejects_wrong_length_digest() {
        let (keystore, digest, _) = keystore_with_rsa_key();
        let err =
            execute(&keystore, Opcode::RsaSign(DigestAlgorithm::Sha256), Some(&digest), &[0u8; 10])
                .unwrap_err();
        assert_eq!(err, DispatchError::Format);
    }

    #[test]
    fn rsa_decrypt_pkcs1_round_trips() {
        let (keystore, digest, key) = keystore_with_rsa_key();
        let mut rng = rand::thread_rng();
        let ciphertext =
            key.to_public_key().encrypt(&mut rng, Pkcs1v15Encrypt, b"secret message").unwrap();

        let plaintext =
            execute(&keystore, Opcode::RsaDecrypt, Some(&digest), &ciphertext).unwrap();
        assert_eq!(plaintext, b"secret message");
    }
}

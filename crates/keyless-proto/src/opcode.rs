//! Operation codes carried in the `OPCODE` item of a frame payload.

/// A digest algorithm a signing operation is performed over.
///
/// The client has already hashed the message; the `PAYLOAD` item carries the
/// raw digest bytes, not the original message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// The MD5+SHA1 concatenation used by TLS 1.0/1.1 RSA signatures.
    Md5Sha1,
    /// SHA-1.
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Expected length in bytes of a pre-computed digest of this kind.
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5Sha1 => 36,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// The operation a request frame asks the server to perform, or the kind of
/// response frame being sent back.
///
/// Byte values for the request opcodes follow the values used by deployed
/// keyless-signing protocols in the wild; `RESPONSE`/`ERROR` are this
/// implementation's own choice for the two response-only markers (see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Keepalive request; expects a `Pong` response.
    Ping,
    /// Keepalive response to a `Ping` request.
    Pong,
    /// RSA decryption with PKCS#1 v1.5 padding removal.
    RsaDecrypt,
    /// Raw RSA decryption with no padding removal.
    RsaDecryptRaw,
    /// RSA signature over a pre-computed digest.
    RsaSign(DigestAlgorithm),
    /// ECDSA signature over a pre-computed digest.
    EcdsaSign(DigestAlgorithm),
    /// Marks a successful response frame.
    Response,
    /// Marks an error response frame.
    Error,
}

impl Opcode {
    /// True for opcodes that only ever appear on a response frame; receiving
    /// one of these in a request is `UNEXPECTED_OPCODE`.
    #[must_use]
    pub fn is_response_only(self) -> bool {
        matches!(self, Self::Pong | Self::Response | Self::Error)
    }

    /// Decode a wire opcode byte. Returns `None` for unrecognized codes
    /// (`BAD_OPCODE`).
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        use DigestAlgorithm::{Md5Sha1, Sha1, Sha224, Sha256, Sha384, Sha512};
        Some(match byte {
            0x01 => Self::RsaDecrypt,
            0x02 => Self::RsaSign(Md5Sha1),
            0x03 => Self::RsaSign(Sha1),
            0x04 => Self::RsaSign(Sha224),
            0x05 => Self::RsaSign(Sha256),
            0x06 => Self::RsaSign(Sha384),
            0x07 => Self::RsaSign(Sha512),
            0x08 => Self::RsaDecryptRaw,
            0x12 => Self::EcdsaSign(Md5Sha1),
            0x13 => Self::EcdsaSign(Sha1),
            0x14 => Self::EcdsaSign(Sha224),
            0x15 => Self::EcdsaSign(Sha256),
            0x16 => Self::EcdsaSign(Sha384),
            0x17 => Self::EcdsaSign(Sha512),
            0xF0 => Self::Response,
            0xF1 => Self::Ping,
            0xF2 => Self::Pong,
            0xFF => Self::Error,
            _ => return None,
        })
    }

    /// Encode to the wire opcode byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        use DigestAlgorithm::{Md5Sha1, Sha1, Sha224, Sha256, Sha384, Sha512};
        match self {
            Self::RsaDecrypt => 0x01,
            Self::RsaSign(Md5Sha1) => 0x02,
            Self::RsaSign(Sha1) => 0x03,
            Self::RsaSign(Sha224) => 0x04,
            Self::RsaSign(Sha256) => 0x05,
            Self::RsaSign(Sha384) => 0x06,
            Self::RsaSign(Sha512) => 0x07,
            Self::RsaDecryptRaw => 0x08,
            Self::EcdsaSign(Md5Sha1) => 0x12,
            Self::EcdsaSign(Sha1) => 0x13,
            Self::EcdsaSign(Sha224) => 0x14,
            Self::EcdsaSign(Sha256) => 0x15,
            Self::EcdsaSign(Sha384) => 0x16,
            Self::EcdsaSign(Sha512) => 0x17,
            Self::Response => 0xF0,
            Self::Ping => 0xF1,
            Self::Pong => 0xF2,
            Self::Error => 0xFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_known_opcode() {
        let all = [
            Opcode::Ping,
            Opcode::Pong,
            Opcode::RsaDecrypt,
            Opcode::RsaDecryptRaw,
            Opcode::RsaSign(DigestAlgorithm::Md5Sha1),
            Opcode::RsaSign(DigestAlgorithm::Sha1),
            Opcode::RsaSign(DigestAlgorithm::Sha224),
            Opcode::RsaSign(DigestAlgorithm::Sha256),
            Opcode::RsaSign(DigestAlgorithm::Sha384),
            Opcode::RsaSign(DigestAlgorithm::Sha512),
            Opcode::EcdsaSign(DigestAlgorithm::Sha256),
            Opcode::Response,
            Opcode::Error,
        ];
        for opcode in all {
            assert_eq!(Opcode::from_u8(opcode.to_u8()), Some(opcode));
        }
    }

    #[test]
    fn rejects_unknown_byte() {
        assert_eq!(Opcode::from_u8(0x99), None);
    }

    #[test]
    fn response_only_opcodes_are_flagged() {
        assert!(Opcode::Pong.is_response_only());
        assert!(Opcode::Response.is_response_only());
        assert!(Opcode::Error.is_response_only());
        assert!(!Opcode::Ping.is_response_only());
        assert!(!Opcode::RsaDecrypt.is_response_only());
    }
}

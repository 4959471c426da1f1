use crate::crypto::CryptoError;

/// Header packet encryption methods (`method` word of every packet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderMethod {
    X25519ChaCha20IetfPoly1305 = 0,
}

impl TryFrom<u32> for HeaderMethod {
    type Error = CryptoError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HeaderMethod::X25519ChaCha20IetfPoly1305),
            other => Err(CryptoError::UnsupportedHeaderMethod(other)),
        }
    }
}

/// Payload segment ciphers named by data-encryption-parameters packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadCipher {
    ChaCha20IetfPoly1305 = 0,
}

impl TryFrom<u32> for PayloadCipher {
    type Error = CryptoError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PayloadCipher::ChaCha20IetfPoly1305),
            other => Err(CryptoError::UnsupportedPayloadCipher(other)),
        }
    }
}

/// Key derivation functions found in private key records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfId {
    None,
    Scrypt,
    Bcrypt,
    Pbkdf2HmacSha256,
}

impl KdfId {
    pub fn name(self) -> &'static str {
        match self {
            KdfId::None => "none",
            KdfId::Scrypt => "scrypt",
            KdfId::Bcrypt => "bcrypt",
            KdfId::Pbkdf2HmacSha256 => "pbkdf2_hmac_sha256",
        }
    }

    pub fn from_name(name: &[u8]) -> Result<Self, CryptoError> {
        match name {
            b"none" => Ok(KdfId::None),
            b"scrypt" => Ok(KdfId::Scrypt),
            b"bcrypt" => Ok(KdfId::Bcrypt),
            b"pbkdf2_hmac_sha256" => Ok(KdfId::Pbkdf2HmacSha256),
            other => Err(CryptoError::UnsupportedKdf(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

/// Ciphers protecting the secret inside a private key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCipherId {
    None,
    ChaCha20Poly1305,
}

impl KeyCipherId {
    pub fn name(self) -> &'static str {
        match self {
            KeyCipherId::None => "none",
            KeyCipherId::ChaCha20Poly1305 => "chacha20_poly1305",
        }
    }

    pub fn from_name(name: &[u8]) -> Result<Self, CryptoError> {
        match name {
            b"none" => Ok(KeyCipherId::None),
            b"chacha20_poly1305" => Ok(KeyCipherId::ChaCha20Poly1305),
            other => Err(CryptoError::UnsupportedKeyCipher(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

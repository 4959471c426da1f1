use thiserror::Error;

use crate::error::ErrorCategory;

pub mod aead;
pub mod ids;
pub mod kdf;
pub mod keys;
pub mod kx;
pub mod wrap;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid key length: expected {expected}, found {found}")]
    InvalidKeyLength { expected: usize, found: usize },
    #[error("invalid nonce length: expected {expected}, found {found}")]
    InvalidNonceLength { expected: usize, found: usize },
    #[error("malformed key: {0}")]
    InvalidKeyFormat(String),
    #[error("private key is encrypted and no passphrase was supplied")]
    PassphraseRequired,
    #[error("wrong passphrase for private key")]
    WrongPassphrase,
    #[error("unsupported key derivation function: {0}")]
    UnsupportedKdf(String),
    #[error("unsupported private key cipher: {0}")]
    UnsupportedKeyCipher(String),
    #[error("key derivation failed: {0}")]
    Kdf(&'static str),
    #[error("unsupported header encryption method: {0}")]
    UnsupportedHeaderMethod(u32),
    #[error("unsupported payload cipher: {0}")]
    UnsupportedPayloadCipher(u32),
    #[error("malformed packet body: {0} bytes")]
    MalformedPacketBody(usize),
    #[error("packet was not written by the expected sender")]
    SenderMismatch,
    #[error("key agreement produced a non-contributory shared secret")]
    NonContributory,
    #[error("key file already exists: {0}")]
    KeyFileExists(String),
    #[error("authentication failed")]
    AuthFailed,
    #[error("truncated input")]
    Truncated,
}

impl CryptoError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CryptoError::Io(err) => ErrorCategory::of_io(err),
            CryptoError::InvalidKeyFormat(_)
            | CryptoError::InvalidKeyLength { .. }
            | CryptoError::UnsupportedKdf(_)
            | CryptoError::UnsupportedKeyCipher(_)
            | CryptoError::KeyFileExists(_) => ErrorCategory::KeyFormat,
            CryptoError::PassphraseRequired | CryptoError::WrongPassphrase => {
                ErrorCategory::Passphrase
            }
            CryptoError::SenderMismatch => ErrorCategory::SenderAuthentication,
            CryptoError::Truncated => ErrorCategory::TruncatedStream,
            _ => ErrorCategory::Crypto,
        }
    }
}

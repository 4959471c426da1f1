use std::io::{Read, Write};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand_core::{OsRng, RngCore};
use tracing::trace;
use zeroize::Zeroizing;

use crate::crypto::CryptoError;
use crate::io_ext::read_full;

pub const AEAD_KEY_LEN: usize = 32;
pub const AEAD_NONCE_LEN: usize = 12;
pub const AEAD_TAG_LEN: usize = 16;
/// Plaintext bytes carried by every payload segment but the last.
pub const SEGMENT_SIZE: usize = 64 * 1024;
pub const CIPHER_SEGMENT_SIZE: usize = AEAD_NONCE_LEN + SEGMENT_SIZE + AEAD_TAG_LEN;

pub fn generate_nonce() -> [u8; AEAD_NONCE_LEN] {
    let mut nonce = [0u8; AEAD_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn generate_key() -> Zeroizing<[u8; AEAD_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    OsRng.fill_bytes(key.as_mut());
    key
}

/// ChaCha20-Poly1305 (IETF) encryption, returning `ciphertext || tag`.
pub fn seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = validate_key(key)?;
    let nonce = validate_nonce(nonce)?;

    ChaCha20Poly1305::new(&key)
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::AuthFailed)
}

pub fn open(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let key = validate_key(key)?;
    let nonce = validate_nonce(nonce)?;

    ChaCha20Poly1305::new(&key)
        .decrypt(&nonce, ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::AuthFailed)
}

/// Encrypts one payload segment as `nonce || ciphertext || tag`.
pub fn encrypt_segment(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = generate_nonce();
    let ciphertext = seal(key, &nonce, plaintext)?;

    let mut out = Vec::with_capacity(AEAD_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts one segment, trying every session key in order.
pub fn decrypt_segment<K: AsRef<[u8]>>(
    keys: &[K],
    segment: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if segment.len() < AEAD_NONCE_LEN + AEAD_TAG_LEN {
        return Err(CryptoError::Truncated);
    }

    let (nonce, ciphertext) = segment.split_at(AEAD_NONCE_LEN);
    for key in keys {
        if let Ok(plaintext) = open(key.as_ref(), nonce, ciphertext) {
            return Ok(plaintext);
        }
    }

    Err(CryptoError::AuthFailed)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub segments: u64,
    pub plaintext_len: u64,
}

pub fn encrypt_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    key: &[u8],
) -> Result<StreamStats, CryptoError> {
    validate_key(key)?;

    let mut stats = StreamStats::default();
    let mut buf = Zeroizing::new(vec![0u8; SEGMENT_SIZE]);

    loop {
        let read = read_full(reader, &mut buf)?;
        if read == 0 {
            break;
        }

        let segment = encrypt_segment(key, &buf[..read])?;
        writer.write_all(&segment)?;
        stats.segments += 1;
        stats.plaintext_len += read as u64;

        if read < SEGMENT_SIZE {
            break;
        }
    }

    trace!(segments = stats.segments, bytes = stats.plaintext_len, "payload encrypted");
    Ok(stats)
}

/// Pulls ciphertext segments from `reader` and hands out plaintext.
pub struct DecryptReader<R: Read> {
    reader: R,
    keys: Vec<Zeroizing<[u8; AEAD_KEY_LEN]>>,
    buffer: Zeroizing<Vec<u8>>,
    position: usize,
    done: bool,
    segments: u64,
}

impl<R: Read> DecryptReader<R> {
    pub fn new(reader: R, keys: Vec<Zeroizing<[u8; AEAD_KEY_LEN]>>) -> Result<Self, CryptoError> {
        if keys.is_empty() {
            return Err(CryptoError::InvalidKeyLength {
                expected: AEAD_KEY_LEN,
                found: 0,
            });
        }

        Ok(Self {
            reader,
            keys,
            buffer: Zeroizing::new(Vec::new()),
            position: 0,
            done: false,
            segments: 0,
        })
    }

    pub fn segments(&self) -> u64 {
        self.segments
    }

    pub fn read_plaintext(&mut self, out: &mut [u8]) -> Result<usize, CryptoError> {
        if out.is_empty() {
            return Ok(0);
        }

        if self.position >= self.buffer.len() {
            self.fill_buffer()?;
        }

        if self.buffer.is_empty() {
            return Ok(0);
        }

        let remaining = self.buffer.len() - self.position;
        let to_copy = std::cmp::min(remaining, out.len());
        out[..to_copy].copy_from_slice(&self.buffer[self.position..self.position + to_copy]);
        self.position += to_copy;
        Ok(to_copy)
    }

    fn fill_buffer(&mut self) -> Result<(), CryptoError> {
        self.buffer.clear();
        self.position = 0;

        // Empty trailing segments carry no data; keep pulling until one has some.
        while !self.done && self.buffer.is_empty() {
            let mut cipher_buf = vec![0u8; CIPHER_SEGMENT_SIZE];
            let read = read_full(&mut self.reader, &mut cipher_buf)?;
            if read < CIPHER_SEGMENT_SIZE {
                self.done = true;
            }
            if read == 0 {
                break;
            }

            let plaintext = decrypt_segment(&self.keys, &cipher_buf[..read])?;
            self.segments += 1;
            self.buffer = plaintext;
        }

        Ok(())
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        self.read_plaintext(out).map_err(std::io::Error::other)
    }
}

fn validate_key(key: &[u8]) -> Result<Key, CryptoError> {
    if key.len() != AEAD_KEY_LEN {
        return Err(CryptoError::InvalidKeyLength {
            expected: AEAD_KEY_LEN,
            found: key.len(),
        });
    }

    Ok(Key::from_slice(key).to_owned())
}

fn validate_nonce(nonce: &[u8]) -> Result<Nonce, CryptoError> {
    if nonce.len() != AEAD_NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength {
            expected: AEAD_NONCE_LEN,
            found: nonce.len(),
        });
    }

    Ok(Nonce::from_slice(nonce).to_owned())
}

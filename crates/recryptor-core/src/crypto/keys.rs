//! Crypt4GH key records.
//!
//! Public keys are PEM-armored raw X25519 points. Private keys are
//! PEM-armored `c4gh-v1` records, optionally protected by a passphrase
//! through scrypt (written) or PBKDF2-HMAC-SHA256 and bcrypt (read only) and
//! sealed with ChaCha20-Poly1305.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use pem::{EncodeConfig, LineEnding, Pem};
use rand_core::OsRng;
use tracing::debug;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use crate::crypto::aead::{self, AEAD_NONCE_LEN, AEAD_TAG_LEN};
use crate::crypto::ids::{KdfId, KeyCipherId};
use crate::crypto::kdf::{self, DEFAULT_SALT_LEN};
use crate::crypto::kx::{self, X25519_KEY_LEN};
use crate::crypto::CryptoError;

pub const PUBLIC_KEY_LABEL: &str = "CRYPT4GH PUBLIC KEY";
pub const PRIVATE_KEY_LABEL: &str = "CRYPT4GH PRIVATE KEY";
pub const LEGACY_PRIVATE_KEY_LABEL: &str = "CRYPT4GH ENCRYPTED PRIVATE KEY";
pub const PRIVATE_KEY_MAGIC: &[u8] = b"c4gh-v1";

const SEALED_SECRET_LEN: usize = AEAD_NONCE_LEN + X25519_KEY_LEN + AEAD_TAG_LEN;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; X25519_KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; X25519_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LEN] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; X25519_KEY_LEN] {
        self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// How a private key record was protected on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyProtection {
    pub kdf: KdfId,
    pub rounds: u32,
    pub salt: Vec<u8>,
}

#[derive(Clone)]
pub struct PrivateKey {
    secret: Zeroizing<[u8; X25519_KEY_LEN]>,
    public: PublicKey,
    protection: Option<KeyProtection>,
    comment: Option<String>,
}

impl PrivateKey {
    pub fn from_secret(secret: Zeroizing<[u8; X25519_KEY_LEN]>) -> Self {
        let public = PublicKey(kx::public_key_from_private(&secret));
        Self {
            secret,
            public,
            protection: None,
            comment: None,
        }
    }

    /// Fresh X25519 secret from the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_secret(Zeroizing::new(secret.to_bytes()))
    }

    pub fn secret(&self) -> &[u8; X25519_KEY_LEN] {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn protection(&self) -> Option<&KeyProtection> {
        self.protection.as_ref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public)
            .field("protection", &self.protection)
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

/// Loads a private key record.
///
/// `passphrase` is only called when the record is encrypted, and at most once.
/// A callback returning `None` or an empty string yields
/// [`CryptoError::PassphraseRequired`].
pub fn load_private_key<F>(bytes: &[u8], passphrase: F) -> Result<PrivateKey, CryptoError>
where
    F: FnOnce() -> Option<Zeroizing<String>>,
{
    let record = if looks_armored(bytes) {
        let armor = parse_armor(bytes)?;
        if armor.tag() != PRIVATE_KEY_LABEL && armor.tag() != LEGACY_PRIVATE_KEY_LABEL {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "unexpected armor label {}",
                armor.tag()
            )));
        }
        Zeroizing::new(armor.into_contents())
    } else if bytes.starts_with(PRIVATE_KEY_MAGIC) {
        Zeroizing::new(bytes.to_vec())
    } else {
        return Err(CryptoError::InvalidKeyFormat(
            "not a crypt4gh private key".to_string(),
        ));
    };

    decode_private_record(&record, passphrase)
}

/// Loads a public key from PEM armor or from its 32 raw bytes.
pub fn load_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    if looks_armored(bytes) {
        let armor = parse_armor(bytes)?;
        if armor.tag() != PUBLIC_KEY_LABEL {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "unexpected armor label {}",
                armor.tag()
            )));
        }
        return public_from_slice(armor.contents());
    }

    public_from_slice(bytes)
}

pub fn encode_public_key(key: &PublicKey) -> Vec<u8> {
    armor(PUBLIC_KEY_LABEL, key.as_bytes().to_vec()).into_bytes()
}

/// Serializes `key` as an armored record, sealing it when `passphrase` is
/// non-empty.
pub fn encode_private_key(
    key: &PrivateKey,
    passphrase: Option<&str>,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut record = Zeroizing::new(Vec::with_capacity(128));
    record.extend_from_slice(PRIVATE_KEY_MAGIC);

    match passphrase.filter(|p| !p.is_empty()) {
        Some(passphrase) => {
            let salt = kdf::generate_salt(DEFAULT_SALT_LEN);
            let derived = kdf::derive_key(KdfId::Scrypt, passphrase.as_bytes(), &salt, 0)?;
            let nonce = aead::generate_nonce();
            let sealed = aead::seal(derived.as_ref(), &nonce, key.secret())?;

            let mut options = Vec::with_capacity(4 + salt.len());
            options.extend_from_slice(&0u32.to_be_bytes());
            options.extend_from_slice(&salt);

            let mut data = Zeroizing::new(Vec::with_capacity(SEALED_SECRET_LEN));
            data.extend_from_slice(&nonce);
            data.extend_from_slice(&sealed);

            put_string(&mut record, KdfId::Scrypt.name().as_bytes())?;
            put_string(&mut record, &options)?;
            put_string(&mut record, KeyCipherId::ChaCha20Poly1305.name().as_bytes())?;
            put_string(&mut record, &data)?;
        }
        None => {
            put_string(&mut record, KdfId::None.name().as_bytes())?;
            put_string(&mut record, KeyCipherId::None.name().as_bytes())?;
            put_string(&mut record, key.secret())?;
        }
    }

    if let Some(comment) = key.comment() {
        put_string(&mut record, comment.as_bytes())?;
    }

    let text = armor(PRIVATE_KEY_LABEL, record.to_vec());
    Ok(Zeroizing::new(text.into_bytes()))
}

/// Generates a keypair and returns `(private record, public record)`.
pub fn generate_keypair(
    passphrase: Option<&str>,
    comment: Option<&str>,
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError> {
    let key = PrivateKey::generate().with_comment(comment.map(str::to_string));
    let private = encode_private_key(&key, passphrase)?;
    let public = encode_public_key(&key.public_key());
    debug!(
        protected = passphrase.is_some_and(|p| !p.is_empty()),
        "generated keypair"
    );
    Ok((private, public))
}

/// Writes a key record, refusing to replace an existing file unless `force`.
/// Private records are created with owner-only permissions on unix.
pub fn write_key_file<P: AsRef<Path>>(
    path: P,
    record: &[u8],
    private: bool,
    force: bool,
) -> Result<(), CryptoError> {
    let path = path.as_ref();
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    if force {
        options.truncate(true);
    } else {
        options.create_new(true);
    }
    if private {
        restrict_permissions(&mut options);
    }

    let mut file = options.open(path).map_err(|err| {
        if err.kind() == io::ErrorKind::AlreadyExists {
            CryptoError::KeyFileExists(path.display().to_string())
        } else {
            CryptoError::Io(err)
        }
    })?;
    file.write_all(record)?;
    file.flush()?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn restrict_permissions(_options: &mut OpenOptions) {}

pub fn read_key_file<P: AsRef<Path>>(path: P) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut file = File::open(path)?;
    let mut bytes = Zeroizing::new(Vec::new());
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn decode_private_record<F>(record: &[u8], passphrase: F) -> Result<PrivateKey, CryptoError>
where
    F: FnOnce() -> Option<Zeroizing<String>>,
{
    let mut cursor = RecordCursor::new(record);
    if cursor.take(PRIVATE_KEY_MAGIC.len())? != PRIVATE_KEY_MAGIC {
        return Err(CryptoError::InvalidKeyFormat("bad record magic".to_string()));
    }

    let kdf = KdfId::from_name(cursor.string()?)?;
    let protection = match kdf {
        KdfId::None => None,
        KdfId::Scrypt | KdfId::Pbkdf2HmacSha256 | KdfId::Bcrypt => {
            let options = cursor.string()?;
            if options.len() < 4 {
                return Err(CryptoError::InvalidKeyFormat(
                    "truncated kdf options".to_string(),
                ));
            }
            let (rounds, salt) = options.split_at(4);
            Some(KeyProtection {
                kdf,
                rounds: u32::from_be_bytes([rounds[0], rounds[1], rounds[2], rounds[3]]),
                salt: salt.to_vec(),
            })
        }
    };

    let cipher = KeyCipherId::from_name(cursor.string()?)?;
    let data = cursor.string()?;
    let comment = if cursor.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(cursor.string()?).into_owned())
    };
    if !cursor.is_empty() {
        return Err(CryptoError::InvalidKeyFormat(
            "trailing bytes after key record".to_string(),
        ));
    }

    let secret = match (&protection, cipher) {
        (None, KeyCipherId::None) => secret_from_slice(data)?,
        (Some(protection), KeyCipherId::ChaCha20Poly1305) => {
            unseal_secret(protection, data, passphrase)?
        }
        _ => {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "cipher {} does not match kdf {}",
                cipher.name(),
                kdf.name()
            )))
        }
    };

    let mut key = PrivateKey::from_secret(secret).with_comment(comment);
    key.protection = protection;
    Ok(key)
}

fn unseal_secret<F>(
    protection: &KeyProtection,
    data: &[u8],
    passphrase: F,
) -> Result<Zeroizing<[u8; X25519_KEY_LEN]>, CryptoError>
where
    F: FnOnce() -> Option<Zeroizing<String>>,
{
    if data.len() != SEALED_SECRET_LEN {
        return Err(CryptoError::InvalidKeyFormat(format!(
            "sealed secret is {} bytes",
            data.len()
        )));
    }

    let passphrase = passphrase()
        .filter(|p| !p.is_empty())
        .ok_or(CryptoError::PassphraseRequired)?;
    let derived = kdf::derive_key(
        protection.kdf,
        passphrase.as_bytes(),
        &protection.salt,
        protection.rounds,
    )?;

    let (nonce, sealed) = data.split_at(AEAD_NONCE_LEN);
    let plaintext = match aead::open(derived.as_ref(), nonce, sealed) {
        Ok(plaintext) => plaintext,
        Err(CryptoError::AuthFailed) => return Err(CryptoError::WrongPassphrase),
        Err(err) => return Err(err),
    };
    secret_from_slice(&plaintext)
}

fn secret_from_slice(bytes: &[u8]) -> Result<Zeroizing<[u8; X25519_KEY_LEN]>, CryptoError> {
    if bytes.len() != X25519_KEY_LEN {
        return Err(CryptoError::InvalidKeyLength {
            expected: X25519_KEY_LEN,
            found: bytes.len(),
        });
    }
    let mut secret = Zeroizing::new([0u8; X25519_KEY_LEN]);
    secret.copy_from_slice(bytes);
    Ok(secret)
}

fn public_from_slice(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let key: [u8; X25519_KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: X25519_KEY_LEN,
        found: bytes.len(),
    })?;
    Ok(PublicKey(key))
}

fn looks_armored(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"-----BEGIN ")
}

fn parse_armor(bytes: &[u8]) -> Result<Pem, CryptoError> {
    pem::parse(bytes).map_err(|err| CryptoError::InvalidKeyFormat(err.to_string()))
}

fn armor(label: &str, contents: Vec<u8>) -> String {
    let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
    pem::encode_config(&Pem::new(label, contents), config)
}

fn put_string(out: &mut Vec<u8>, value: &[u8]) -> Result<(), CryptoError> {
    let len = u16::try_from(value.len())
        .map_err(|_| CryptoError::InvalidKeyFormat("key record field too long".to_string()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value);
    Ok(())
}

struct RecordCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CryptoError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| CryptoError::InvalidKeyFormat("truncated key record".to_string()))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn string(&mut self) -> Result<&'a [u8], CryptoError> {
        let len = self.take(2)?;
        let len = u16::from_be_bytes([len[0], len[1]]) as usize;
        self.take(len)
    }
}

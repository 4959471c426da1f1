//! X25519 key agreement as used by header packets.
//!
//! The shared key is `BLAKE2b-512(dh || reader_pk || writer_pk)[..32]`, which
//! matches libsodium's `crypto_kx` session keys. The writer uses its receive
//! side and the reader its transmit side, so both ends derive the same bytes.

use blake2::{Blake2b512, Digest};
use x25519_dalek::{PublicKey as DalekPublic, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::aead::AEAD_KEY_LEN;
use crate::crypto::CryptoError;
use crate::util::zeroize_bytes;

pub const X25519_KEY_LEN: usize = 32;

pub fn public_key_from_private(private_key: &[u8; X25519_KEY_LEN]) -> [u8; X25519_KEY_LEN] {
    let secret = StaticSecret::from(*private_key);
    DalekPublic::from(&secret).to_bytes()
}

/// Shared key computed by the party that writes a packet for `reader_pk`.
pub fn derive_writer_key(
    writer_sk: &[u8; X25519_KEY_LEN],
    reader_pk: &[u8; X25519_KEY_LEN],
) -> Result<Zeroizing<[u8; AEAD_KEY_LEN]>, CryptoError> {
    let writer_pk = public_key_from_private(writer_sk);
    shared_key(writer_sk, reader_pk, reader_pk, &writer_pk)
}

/// Shared key computed by the reader of a packet sent by `writer_pk`.
pub fn derive_reader_key(
    reader_sk: &[u8; X25519_KEY_LEN],
    writer_pk: &[u8; X25519_KEY_LEN],
) -> Result<Zeroizing<[u8; AEAD_KEY_LEN]>, CryptoError> {
    let reader_pk = public_key_from_private(reader_sk);
    shared_key(reader_sk, writer_pk, &reader_pk, writer_pk)
}

fn shared_key(
    own_sk: &[u8; X25519_KEY_LEN],
    peer_pk: &[u8; X25519_KEY_LEN],
    reader_pk: &[u8; X25519_KEY_LEN],
    writer_pk: &[u8; X25519_KEY_LEN],
) -> Result<Zeroizing<[u8; AEAD_KEY_LEN]>, CryptoError> {
    let secret = StaticSecret::from(*own_sk);
    let shared = secret.diffie_hellman(&DalekPublic::from(*peer_pk));
    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    let mut hasher = Blake2b512::new();
    hasher.update(shared.as_bytes());
    hasher.update(reader_pk);
    hasher.update(writer_pk);
    let mut digest = hasher.finalize();

    let mut key = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    key.copy_from_slice(&digest[..AEAD_KEY_LEN]);
    zeroize_bytes(digest.as_mut_slice());
    Ok(key)
}

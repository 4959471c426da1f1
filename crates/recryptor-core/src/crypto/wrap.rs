use zeroize::Zeroizing;

use crate::crypto::aead::{self, AEAD_NONCE_LEN, AEAD_TAG_LEN};
use crate::crypto::kx::{self, X25519_KEY_LEN};
use crate::crypto::CryptoError;
use crate::util::ct_eq;

/// Smallest well-formed method-0 packet body: writer key, nonce and tag.
pub const MIN_SEALED_BODY_LEN: usize = X25519_KEY_LEN + AEAD_NONCE_LEN + AEAD_TAG_LEN;

/// Encrypts a packet plaintext for `recipient_pk`, producing
/// `writer_pk || nonce || ciphertext || tag`.
pub fn seal_packet_body(
    writer_sk: &[u8; X25519_KEY_LEN],
    recipient_pk: &[u8; X25519_KEY_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let writer_pk = kx::public_key_from_private(writer_sk);
    let shared = kx::derive_writer_key(writer_sk, recipient_pk)?;
    let nonce = aead::generate_nonce();
    let ciphertext = aead::seal(shared.as_ref(), &nonce, plaintext)?;

    let mut out = Vec::with_capacity(X25519_KEY_LEN + AEAD_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&writer_pk);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Opens a sealed packet body with the reader's secret key.
///
/// When `expected_sender` is given, a body whose embedded writer key differs is
/// rejected before any decryption is attempted.
pub fn open_packet_body(
    reader_sk: &[u8; X25519_KEY_LEN],
    body: &[u8],
    expected_sender: Option<&[u8; X25519_KEY_LEN]>,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if body.len() < MIN_SEALED_BODY_LEN {
        return Err(CryptoError::MalformedPacketBody(body.len()));
    }

    let (writer_pk, rest) = body.split_at(X25519_KEY_LEN);
    let (nonce, ciphertext) = rest.split_at(AEAD_NONCE_LEN);

    if let Some(sender) = expected_sender {
        if !ct_eq(sender, writer_pk) {
            return Err(CryptoError::SenderMismatch);
        }
    }

    let mut writer = [0u8; X25519_KEY_LEN];
    writer.copy_from_slice(writer_pk);
    let shared = kx::derive_reader_key(reader_sk, &writer)?;
    aead::open(shared.as_ref(), nonce, ciphertext)
}

/// Returns the writer public key embedded in a sealed body, if it is long enough.
pub fn sealed_writer_key(body: &[u8]) -> Option<[u8; X25519_KEY_LEN]> {
    if body.len() < MIN_SEALED_BODY_LEN {
        return None;
    }
    let mut writer = [0u8; X25519_KEY_LEN];
    writer.copy_from_slice(&body[..X25519_KEY_LEN]);
    Some(writer)
}

//! Opening header packets and wrapping their plaintext for new recipients.

use recryptor_core::crypto::ids::HeaderMethod;
use recryptor_core::crypto::keys::{PrivateKey, PublicKey};
use recryptor_core::crypto::wrap::{open_packet_body, seal_packet_body};
use recryptor_core::crypto::CryptoError;
use tracing::trace;

use crate::header::{FormatError, HeaderPacket};
use crate::packet::PacketPayload;

/// Key used to open packets, optionally bound to the sender that wrote them.
#[derive(Debug, Clone)]
pub struct DecryptionKey {
    pub method: HeaderMethod,
    pub private_key: PrivateKey,
    pub sender: Option<PublicKey>,
}

impl DecryptionKey {
    pub fn new(private_key: PrivateKey) -> Self {
        Self {
            method: HeaderMethod::X25519ChaCha20IetfPoly1305,
            private_key,
            sender: None,
        }
    }

    pub fn with_sender(mut self, sender: Option<PublicKey>) -> Self {
        self.sender = sender;
        self
    }
}

/// Key pair used to produce a packet: the writer's secret and the reader's public key.
#[derive(Debug, Clone)]
pub struct RecipientKey {
    pub method: HeaderMethod,
    pub writer_key: PrivateKey,
    pub recipient: PublicKey,
}

impl RecipientKey {
    pub fn new(writer_key: PrivateKey, recipient: PublicKey) -> Self {
        Self {
            method: HeaderMethod::X25519ChaCha20IetfPoly1305,
            writer_key,
            recipient,
        }
    }

    /// One recipient entry per public key, all written by `writer_key`.
    pub fn for_recipients<I>(writer_key: &PrivateKey, recipients: I) -> Vec<Self>
    where
        I: IntoIterator<Item = PublicKey>,
    {
        recipients
            .into_iter()
            .map(|recipient| Self::new(writer_key.clone(), recipient))
            .collect()
    }
}

/// Why a single key could not open a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptFailure {
    UnsupportedMethod(u32),
    MethodMismatch,
    SenderMismatch,
    Malformed,
    Unauthenticated,
}

/// Every failed attempt at opening one packet, in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketRejection {
    pub failures: Vec<AttemptFailure>,
}

impl PacketRejection {
    pub fn sender_mismatch(&self) -> bool {
        self.failures.contains(&AttemptFailure::SenderMismatch)
    }

    pub fn into_error(self, index: usize) -> FormatError {
        if self.sender_mismatch() {
            FormatError::SenderAuthentication { index: Some(index) }
        } else {
            FormatError::UnauthorizedPacket { index: Some(index) }
        }
    }
}

/// Tries `keys` in order and returns the plaintext from the first key that
/// authenticates the packet.
pub fn open_packet(
    packet: &HeaderPacket,
    keys: &[DecryptionKey],
) -> Result<PacketPayload, PacketRejection> {
    open_packet_as(packet, keys, None)
}

/// Like [`open_packet`], with `sender` overriding the sender bound to each key.
pub fn open_packet_as(
    packet: &HeaderPacket,
    keys: &[DecryptionKey],
    sender: Option<&PublicKey>,
) -> Result<PacketPayload, PacketRejection> {
    let mut rejection = PacketRejection::default();

    let method = match HeaderMethod::try_from(packet.method) {
        Ok(method) => method,
        Err(_) => {
            rejection
                .failures
                .push(AttemptFailure::UnsupportedMethod(packet.method));
            return Err(rejection);
        }
    };

    for (position, key) in keys.iter().enumerate() {
        if key.method != method {
            rejection.failures.push(AttemptFailure::MethodMismatch);
            continue;
        }

        let expected_sender = sender.or(key.sender.as_ref()).map(PublicKey::as_bytes);
        match open_packet_body(key.private_key.secret(), &packet.body, expected_sender) {
            Ok(plaintext) => {
                trace!(key = position, "packet opened");
                return Ok(PacketPayload::from_bytes(plaintext));
            }
            Err(err) => rejection.failures.push(classify(&err)),
        }
    }

    Err(rejection)
}

/// Encrypts `payload` for one recipient under a fresh shared key and nonce.
pub fn wrap_payload(
    payload: &PacketPayload,
    recipient: &RecipientKey,
) -> Result<HeaderPacket, FormatError> {
    let body = seal_packet_body(
        recipient.writer_key.secret(),
        recipient.recipient.as_bytes(),
        payload.as_bytes(),
    )?;
    Ok(HeaderPacket::new(recipient.method as u32, body))
}

fn classify(err: &CryptoError) -> AttemptFailure {
    match err {
        CryptoError::SenderMismatch => AttemptFailure::SenderMismatch,
        CryptoError::MalformedPacketBody(_) => AttemptFailure::Malformed,
        _ => AttemptFailure::Unauthenticated,
    }
}

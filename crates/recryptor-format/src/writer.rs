use std::io::{Read, Write};

use recryptor_core::crypto::aead::{encrypt_stream, generate_key, StreamStats};
use recryptor_core::crypto::ids::PayloadCipher;
use recryptor_core::crypto::keys::{PrivateKey, PublicKey};
use tracing::debug;

use crate::header::{encode_header, FormatError, Header};
use crate::packet::PacketPayload;
use crate::rewrap::{wrap_payload, RecipientKey};

#[derive(Debug, Clone)]
pub struct EncryptedContainer {
    pub header: Header,
    pub stats: StreamStats,
}

/// Writes the encoded header and returns the number of bytes written.
pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<usize, FormatError> {
    let bytes = encode_header(header)?;
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Builds the header packets for a fresh data key: one data-key packet per
/// recipient, followed by one edit-list packet per recipient when an edit
/// list is given.
pub fn build_header(
    data_key: &[u8; 32],
    writer_key: &PrivateKey,
    recipients: &[PublicKey],
    edit_list: Option<&[u64]>,
) -> Result<Header, FormatError> {
    if recipients.is_empty() {
        return Err(FormatError::NoRecipients);
    }

    let mut payloads = vec![PacketPayload::data_key(
        PayloadCipher::ChaCha20IetfPoly1305,
        data_key,
    )];
    if let Some(lengths) = edit_list.filter(|lengths| !lengths.is_empty()) {
        payloads.push(PacketPayload::edit_list(lengths)?);
    }

    let recipients = RecipientKey::for_recipients(writer_key, recipients.iter().copied());
    let mut packets = Vec::with_capacity(payloads.len() * recipients.len());
    for payload in &payloads {
        for recipient in &recipients {
            packets.push(wrap_payload(payload, recipient)?);
        }
    }

    Ok(Header::new(packets))
}

/// Encrypts `reader` into a complete container for `recipients`.
pub fn encrypt<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    writer_key: &PrivateKey,
    recipients: &[PublicKey],
    edit_list: Option<&[u64]>,
) -> Result<EncryptedContainer, FormatError> {
    let data_key = generate_key();
    let header = build_header(&data_key, writer_key, recipients, edit_list)?;

    write_header(writer, &header)?;
    let stats = encrypt_stream(reader, writer, data_key.as_ref())?;
    writer.flush()?;

    debug!(
        recipients = recipients.len(),
        packets = header.packets.len(),
        segments = stats.segments,
        "container encrypted"
    );

    Ok(EncryptedContainer { header, stats })
}

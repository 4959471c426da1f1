use std::io::Read;

use tracing::debug;

use crate::header::{FormatError, Header, HeaderPacket};
use crate::reader::read_header;
use crate::rewrap::{open_packet, wrap_payload, DecryptionKey, RecipientKey};

/// Reads a header from `reader` and re-wraps it for `recipients`.
///
/// Only the header is consumed; anything after it is left unread.
pub fn recrypt<R: Read>(
    reader: &mut R,
    decryption_keys: &[DecryptionKey],
    recipients: &[RecipientKey],
) -> Result<Header, FormatError> {
    let header = read_header(reader)?;
    recrypt_header(&header, decryption_keys, recipients)
}

/// Opens every packet of `header` and wraps its plaintext once per recipient.
///
/// Output packets are grouped by source packet, in source order. A packet no
/// key opens fails the whole call.
pub fn recrypt_header(
    header: &Header,
    decryption_keys: &[DecryptionKey],
    recipients: &[RecipientKey],
) -> Result<Header, FormatError> {
    if decryption_keys.is_empty() {
        return Err(FormatError::NoDecryptionKeys);
    }
    if recipients.is_empty() {
        return Err(FormatError::NoRecipients);
    }

    let opened = header
        .packets
        .iter()
        .enumerate()
        .map(|(index, packet)| {
            open_packet(packet, decryption_keys).map_err(|rejection| rejection.into_error(index))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut packets: Vec<HeaderPacket> = Vec::with_capacity(opened.len() * recipients.len());
    for payload in &opened {
        for recipient in recipients {
            packets.push(wrap_payload(payload, recipient)?);
        }
    }

    debug!(
        source_packets = header.packets.len(),
        recipients = recipients.len(),
        packets = packets.len(),
        "header recrypted"
    );

    Ok(Header {
        version: header.version,
        packets,
    })
}

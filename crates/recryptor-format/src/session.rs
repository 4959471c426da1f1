use recryptor_core::crypto::aead::AEAD_KEY_LEN;
use recryptor_core::crypto::keys::PublicKey;
use recryptor_core::crypto::wrap::sealed_writer_key;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::header::{FormatError, Header};
use crate::packet::PacketContent;
use crate::rewrap::{open_packet_as, DecryptionKey};

/// Everything the payload decryptor needs from a header.
#[derive(Debug)]
pub struct Session {
    pub data_keys: Vec<Zeroizing<[u8; AEAD_KEY_LEN]>>,
    pub edit_list: Option<Vec<u64>>,
    pub opened_packets: usize,
}

/// Opens every packet the keys can open and gathers data keys and the edit list.
///
/// Packets addressed to someone else are skipped. The call fails only when no
/// data key was recovered, or when more than one edit list is present.
pub fn collect_session(
    header: &Header,
    keys: &[DecryptionKey],
    sender: Option<&PublicKey>,
) -> Result<Session, FormatError> {
    if keys.is_empty() {
        return Err(FormatError::NoDecryptionKeys);
    }

    let mut data_keys = Vec::new();
    let mut edit_list: Option<Vec<u64>> = None;
    let mut opened_packets = 0;
    let mut sender_rejections = 0;

    for (index, packet) in header.packets.iter().enumerate() {
        let payload = match open_packet_as(packet, keys, sender) {
            Ok(payload) => payload,
            Err(rejection) => {
                if rejection.sender_mismatch() {
                    sender_rejections += 1;
                }
                trace!(packet = index, "packet skipped");
                continue;
            }
        };
        opened_packets += 1;

        match payload.content()? {
            PacketContent::DataKey { key, .. } => data_keys.push(key),
            PacketContent::EditList(lengths) => {
                if edit_list.is_some() {
                    return Err(FormatError::TooManyEditLists);
                }
                edit_list = Some(lengths);
            }
            PacketContent::Other { packet_type } => {
                debug!(packet = index, packet_type, "ignoring unknown packet type");
            }
        }
    }

    if data_keys.is_empty() {
        return Err(if sender_rejections > 0 {
            FormatError::SenderAuthentication { index: None }
        } else {
            FormatError::UnauthorizedPacket { index: None }
        });
    }

    debug!(
        packets = header.packets.len(),
        opened = opened_packets,
        data_keys = data_keys.len(),
        edit_list = edit_list.is_some(),
        "header opened"
    );

    Ok(Session {
        data_keys,
        edit_list: edit_list.filter(|lengths| !lengths.is_empty()),
        opened_packets,
    })
}

/// What can be said about one packet without failing on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketSummary {
    pub index: usize,
    pub method: u32,
    pub encoded_len: usize,
    pub writer_key: Option<PublicKey>,
    /// Packet type, when one of the supplied keys opens the packet.
    pub packet_type: Option<u32>,
}

pub fn summarize(header: &Header, keys: &[DecryptionKey]) -> Vec<PacketSummary> {
    header
        .packets
        .iter()
        .enumerate()
        .map(|(index, packet)| PacketSummary {
            index,
            method: packet.method,
            encoded_len: packet.encoded_len(),
            writer_key: sealed_writer_key(&packet.body).map(PublicKey::from_bytes),
            packet_type: open_packet_as(packet, keys, None)
                .ok()
                .and_then(|payload| payload.packet_type()),
        })
        .collect()
}

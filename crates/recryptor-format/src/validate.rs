use crate::header::{FormatError, Header, PACKET_PREFIX_LEN, VERSION};

/// Checks that a header can be framed: supported version, a packet count
/// that fits the count word and packet lengths that fit the length word.
pub fn validate_header(header: &Header) -> Result<(), FormatError> {
    if header.version != VERSION {
        return Err(FormatError::UnsupportedVersion(header.version));
    }

    if u32::try_from(header.packets.len()).is_err() {
        return Err(FormatError::InvalidPacketLength {
            index: header.packets.len(),
            length: 0,
        });
    }

    for (index, packet) in header.packets.iter().enumerate() {
        validate_packet_length(index, packet.encoded_len() as u64)?;
    }

    Ok(())
}

pub fn validate_packet_length(index: usize, length: u64) -> Result<(), FormatError> {
    if length < PACKET_PREFIX_LEN as u64 || length > u32::MAX as u64 {
        return Err(FormatError::InvalidPacketLength { index, length });
    }
    Ok(())
}

use std::fmt;

use recryptor_core::crypto::aead::AEAD_KEY_LEN;
use recryptor_core::crypto::ids::PayloadCipher;
use zeroize::Zeroizing;

use crate::header::FormatError;

pub const PACKET_TYPE_DATA_ENC: u32 = 0;
pub const PACKET_TYPE_EDIT_LIST: u32 = 1;
pub const DATA_ENC_PACKET_LEN: usize = 4 + 4 + AEAD_KEY_LEN;

/// Plaintext of an opened header packet.
///
/// The raw bytes are kept verbatim so that re-wrapping carries exactly what
/// was decrypted, including packet types this crate does not understand.
#[derive(Clone, PartialEq, Eq)]
pub struct PacketPayload {
    raw: Zeroizing<Vec<u8>>,
}

#[derive(Debug)]
pub enum PacketContent {
    DataKey {
        cipher: PayloadCipher,
        key: Zeroizing<[u8; AEAD_KEY_LEN]>,
    },
    EditList(Vec<u64>),
    Other { packet_type: u32 },
}

impl PacketPayload {
    pub fn from_bytes(raw: Zeroizing<Vec<u8>>) -> Self {
        Self { raw }
    }

    pub fn data_key(cipher: PayloadCipher, key: &[u8; AEAD_KEY_LEN]) -> Self {
        let mut raw = Zeroizing::new(Vec::with_capacity(DATA_ENC_PACKET_LEN));
        raw.extend_from_slice(&PACKET_TYPE_DATA_ENC.to_le_bytes());
        raw.extend_from_slice(&(cipher as u32).to_le_bytes());
        raw.extend_from_slice(key);
        Self { raw }
    }

    pub fn edit_list(lengths: &[u64]) -> Result<Self, FormatError> {
        let count = u32::try_from(lengths.len())
            .map_err(|_| FormatError::MalformedPacket("edit list too long"))?;

        let mut raw = Zeroizing::new(Vec::with_capacity(8 + lengths.len() * 8));
        raw.extend_from_slice(&PACKET_TYPE_EDIT_LIST.to_le_bytes());
        raw.extend_from_slice(&count.to_le_bytes());
        for length in lengths {
            raw.extend_from_slice(&length.to_le_bytes());
        }
        Ok(Self { raw })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn packet_type(&self) -> Option<u32> {
        read_u32(&self.raw, 0)
    }

    pub fn content(&self) -> Result<PacketContent, FormatError> {
        let packet_type = self
            .packet_type()
            .ok_or(FormatError::MalformedPacket("packet shorter than its type word"))?;

        match packet_type {
            PACKET_TYPE_DATA_ENC => {
                if self.raw.len() != DATA_ENC_PACKET_LEN {
                    return Err(FormatError::MalformedPacket(
                        "data encryption parameters have the wrong length",
                    ));
                }
                let cipher = read_u32(&self.raw, 4)
                    .ok_or(FormatError::MalformedPacket("missing payload cipher"))?;
                let cipher = PayloadCipher::try_from(cipher)?;
                let mut key = Zeroizing::new([0u8; AEAD_KEY_LEN]);
                key.copy_from_slice(&self.raw[8..]);
                Ok(PacketContent::DataKey { cipher, key })
            }
            PACKET_TYPE_EDIT_LIST => {
                let count = read_u32(&self.raw, 4)
                    .ok_or(FormatError::MalformedPacket("missing edit list count"))?
                    as usize;
                let expected = count
                    .checked_mul(8)
                    .and_then(|len| len.checked_add(8))
                    .ok_or(FormatError::MalformedPacket("edit list count overflows"))?;
                if self.raw.len() != expected {
                    return Err(FormatError::MalformedPacket(
                        "edit list length does not match its count",
                    ));
                }
                let lengths = self.raw[8..]
                    .chunks_exact(8)
                    .map(|chunk| {
                        let mut bytes = [0u8; 8];
                        bytes.copy_from_slice(chunk);
                        u64::from_le_bytes(bytes)
                    })
                    .collect();
                Ok(PacketContent::EditList(lengths))
            }
            other => Ok(PacketContent::Other { packet_type: other }),
        }
    }
}

impl fmt::Debug for PacketPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketPayload")
            .field("packet_type", &self.packet_type())
            .field("len", &self.raw.len())
            .finish()
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

use std::io;

use recryptor_core::crypto::CryptoError;
use recryptor_core::ErrorCategory;
use thiserror::Error;

use crate::validate::validate_header;

pub const MAGIC: [u8; 8] = *b"crypt4gh";
pub const VERSION: u32 = 1;
/// Magic, version and packet count.
pub const PREAMBLE_LEN: usize = 16;
/// Length and method words in front of every packet body.
pub const PACKET_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPacket {
    pub method: u32,
    pub body: Vec<u8>,
}

impl HeaderPacket {
    pub fn new(method: u32, body: Vec<u8>) -> Self {
        Self { method, body }
    }

    /// Value of the `packet_length` word, which counts the prefix itself.
    pub fn encoded_len(&self) -> usize {
        PACKET_PREFIX_LEN + self.body.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub packets: Vec<HeaderPacket>,
}

impl Header {
    pub fn new(packets: Vec<HeaderPacket>) -> Self {
        Self {
            version: VERSION,
            packets,
        }
    }

    pub fn encoded_len(&self) -> usize {
        PREAMBLE_LEN
            + self
                .packets
                .iter()
                .map(HeaderPacket::encoded_len)
                .sum::<usize>()
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("truncated input")]
    Truncated,
    #[error("invalid magic")]
    InvalidMagic { found: [u8; 8] },
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),
    #[error("invalid length {length} for packet {index}")]
    InvalidPacketLength { index: usize, length: u64 },
    #[error("malformed packet content: {0}")]
    MalformedPacket(&'static str),
    #[error("no supplied key opens {}", describe_packet(.index))]
    UnauthorizedPacket { index: Option<usize> },
    #[error("{} was not written by the expected sender", describe_packet(.index))]
    SenderAuthentication { index: Option<usize> },
    #[error("header carries more than one edit list")]
    TooManyEditLists,
    #[error("no recipient keys supplied")]
    NoRecipients,
    #[error("no decryption keys supplied")]
    NoDecryptionKeys,
    #[error("trailing data after header")]
    TrailingData,
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl From<io::Error> for FormatError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => FormatError::Truncated,
            io::ErrorKind::Unsupported => FormatError::UnsupportedOperation(err.to_string()),
            _ => FormatError::Io(err),
        }
    }
}

impl FormatError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FormatError::Io(err) => ErrorCategory::of_io(err),
            FormatError::Crypto(err) => err.category(),
            FormatError::Truncated => ErrorCategory::TruncatedStream,
            FormatError::UnauthorizedPacket { .. } => ErrorCategory::UnauthorizedPacket,
            FormatError::SenderAuthentication { .. } => ErrorCategory::SenderAuthentication,
            FormatError::UnsupportedOperation(_) => ErrorCategory::UnsupportedOperation,
            FormatError::InvalidMagic { .. }
            | FormatError::UnsupportedVersion(_)
            | FormatError::InvalidPacketLength { .. }
            | FormatError::MalformedPacket(_)
            | FormatError::TooManyEditLists
            | FormatError::NoRecipients
            | FormatError::NoDecryptionKeys
            | FormatError::TrailingData => ErrorCategory::Format,
        }
    }
}

fn describe_packet(index: &Option<usize>) -> String {
    match index {
        Some(index) => format!("header packet {index}"),
        None => "any header packet".to_string(),
    }
}

/// Serializes a header. The packet count is taken from `header.packets`.
pub fn encode_header(header: &Header) -> Result<Vec<u8>, FormatError> {
    validate_header(header)?;

    let mut buf = Vec::with_capacity(header.encoded_len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&header.version.to_le_bytes());
    buf.extend_from_slice(&(header.packets.len() as u32).to_le_bytes());

    for packet in &header.packets {
        buf.extend_from_slice(&(packet.encoded_len() as u32).to_le_bytes());
        buf.extend_from_slice(&packet.method.to_le_bytes());
        buf.extend_from_slice(&packet.body);
    }

    Ok(buf)
}

pub fn encode_packets(packets: &[HeaderPacket]) -> Result<Vec<u8>, FormatError> {
    encode_header(&Header::new(packets.to_vec()))
}

/// Parses a complete detached header. Bytes after the last packet are rejected.
pub fn parse_header(buf: &[u8]) -> Result<Header, FormatError> {
    let mut cursor = io::Cursor::new(buf);
    let header = crate::reader::read_header(&mut cursor)?;
    if cursor.position() as usize != buf.len() {
        return Err(FormatError::TrailingData);
    }
    Ok(header)
}

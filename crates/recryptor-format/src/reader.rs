use std::io::{self, Read, Write};

use recryptor_core::crypto::aead::{DecryptReader, SEGMENT_SIZE};
use recryptor_core::crypto::keys::PublicKey;
use recryptor_core::io_ext::{read_exact_or_err, read_u32_le};
use recryptor_core::MultiStreamReader;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::edit_list::EditListWriter;
use crate::header::{
    encode_header, FormatError, Header, HeaderPacket, MAGIC, PACKET_PREFIX_LEN, VERSION,
};
use crate::rewrap::DecryptionKey;
use crate::session::collect_session;
use crate::validate::validate_packet_length;

/// What to do with a header found at the front of a payload stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadHeaderPolicy {
    /// The payload stream holds segments only.
    #[default]
    Keep,
    /// The payload stream starts with its own header, which is read and dropped.
    Discard,
}

#[derive(Debug, Clone)]
pub struct DecryptedContainer {
    pub header: Header,
    pub opened_packets: usize,
    pub edit_list: Option<Vec<u64>>,
    pub segments: u64,
    pub plaintext_len: u64,
}

/// Reads exactly one header from the front of `reader`, leaving the payload unread.
pub fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<Header, FormatError> {
    let mut magic = [0u8; 8];
    read_exact_or_err(reader, &mut magic)?;
    if magic != MAGIC {
        return Err(FormatError::InvalidMagic { found: magic });
    }

    let version = read_u32_le(reader)?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let count = read_u32_le(reader)? as usize;
    // The count is untrusted; let the vector grow as packets actually arrive.
    let mut packets = Vec::with_capacity(count.min(64));

    for index in 0..count {
        let length = read_u32_le(reader)? as u64;
        validate_packet_length(index, length)?;
        let method = read_u32_le(reader)?;

        let body_len = length - PACKET_PREFIX_LEN as u64;
        let mut body = Vec::new();
        Read::take(&mut *reader, body_len).read_to_end(&mut body)?;
        if body.len() as u64 != body_len {
            return Err(FormatError::Truncated);
        }

        trace!(packet = index, method, length, "header packet read");
        packets.push(HeaderPacket::new(method, body));
    }

    debug!(packets = packets.len(), "header parsed");
    Ok(Header { version, packets })
}

/// Copies the header of `reader` to `header_sink` and returns it.
pub fn save_header<R: Read, W: Write>(
    reader: &mut R,
    header_sink: &mut W,
) -> Result<Header, FormatError> {
    let header = read_header(reader)?;
    header_sink.write_all(&encode_header(&header)?)?;
    header_sink.flush()?;
    Ok(header)
}

/// Like [`save_header`], then copies the untouched remainder to `payload_sink`.
/// Returns the header and the number of payload bytes copied.
pub fn save_header_and_payload<R: Read, W: Write>(
    reader: &mut R,
    header_sink: &mut W,
    payload_sink: Option<&mut dyn Write>,
) -> Result<(Header, u64), FormatError> {
    let header = save_header(reader, header_sink)?;

    let copied = match payload_sink {
        Some(sink) => {
            let copied = io::copy(reader, sink)?;
            sink.flush()?;
            copied
        }
        None => 0,
    };

    debug!(payload_bytes = copied, "header and payload saved");
    Ok((header, copied))
}

/// Decrypts a complete container (header followed by payload segments).
///
/// With `sender`, only packets written by that key are accepted.
pub fn decrypt<R: Read, W: Write>(
    reader: &mut R,
    keys: &[DecryptionKey],
    writer: &mut W,
    sender: Option<&PublicKey>,
) -> Result<DecryptedContainer, FormatError> {
    let header = read_header(reader)?;
    let session = collect_session(&header, keys, sender)?;

    let mut decrypt_reader = DecryptReader::new(reader, session.data_keys)?;
    let plaintext_len = match &session.edit_list {
        Some(lengths) => {
            let mut edited = EditListWriter::new(&mut *writer, lengths.clone());
            pump(&mut decrypt_reader, &mut edited)?;
            edited.written()
        }
        None => {
            let mut counted = CountingWriter::new(&mut *writer);
            pump(&mut decrypt_reader, &mut counted)?;
            counted.written
        }
    };
    writer.flush()?;

    let segments = decrypt_reader.segments();
    debug!(segments, bytes = plaintext_len, "payload decrypted");

    Ok(DecryptedContainer {
        header,
        opened_packets: session.opened_packets,
        edit_list: session.edit_list,
        segments,
        plaintext_len,
    })
}

/// Decrypts a payload stream using a header kept in a separate stream.
///
/// The two are stitched through a [`MultiStreamReader`] so neither is copied.
pub fn decrypt_detached<H, P, W>(
    header: H,
    mut payload: P,
    keys: &[DecryptionKey],
    writer: &mut W,
    sender: Option<&PublicKey>,
    policy: PayloadHeaderPolicy,
) -> Result<DecryptedContainer, FormatError>
where
    H: Read,
    P: Read,
    W: Write,
{
    if policy == PayloadHeaderPolicy::Discard {
        let discarded = read_header(&mut payload)?;
        debug!(
            packets = discarded.packets.len(),
            "discarded header in front of payload"
        );
    }

    let mut stream = MultiStreamReader::pair(header, payload);
    let result = decrypt(&mut stream, keys, writer, sender);
    stream.close();
    result
}

trait PlaintextSink: Write {
    fn is_done(&self) -> bool {
        false
    }
}

impl<W: Write> PlaintextSink for EditListWriter<W> {
    fn is_done(&self) -> bool {
        EditListWriter::is_done(self)
    }
}

impl<W: Write> PlaintextSink for CountingWriter<W> {}

fn pump<R: Read, S: PlaintextSink>(
    reader: &mut DecryptReader<R>,
    sink: &mut S,
) -> Result<(), FormatError> {
    let mut buffer = Zeroizing::new(vec![0u8; SEGMENT_SIZE]);

    while !sink.is_done() {
        let read = reader.read_plaintext(&mut buffer)?;
        if read == 0 {
            break;
        }
        sink.write_all(&buffer[..read])?;
    }

    Ok(())
}

struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#![deny(warnings)]
#![deny(clippy::all)]

use std::io::{self, Read};

pub const HEADER_MAGIC: &[u8; 8] = b"crypt4gh";

pub fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn flip_byte(buf: &mut [u8], index: usize) {
    if buf.is_empty() {
        return;
    }

    let idx = index % buf.len();
    buf[idx] ^= 0xFF;
}

/// Hand-framed header with the given `(method, body)` packets.
pub fn raw_header(version: u32, packets: &[(u32, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(HEADER_MAGIC);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&(packets.len() as u32).to_le_bytes());
    for (method, body) in packets {
        out.extend_from_slice(&((body.len() + 8) as u32).to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(body);
    }
    out
}

/// Two-packet header with opaque bodies.
pub fn sample_header_bytes() -> Vec<u8> {
    raw_header(1, &[(0, &[0x11u8; 60][..]), (0, &[0x22u8; 60][..])])
}

pub fn invalid_magic_bytes() -> Vec<u8> {
    let mut bytes = sample_header_bytes();
    bytes[0] = b'C';
    bytes
}

pub fn invalid_version_bytes() -> Vec<u8> {
    let mut bytes = sample_header_bytes();
    bytes[8..12].copy_from_slice(&2u32.to_le_bytes());
    bytes
}

/// Sample header cut off in the middle of its second packet.
pub fn truncated_header_bytes() -> Vec<u8> {
    let mut bytes = sample_header_bytes();
    bytes.truncate(bytes.len() - 10);
    bytes
}

/// Header declaring `declared` packets but carrying none.
pub fn header_with_missing_packets(declared: u32) -> Vec<u8> {
    let mut out = raw_header(1, &[]);
    out[12..16].copy_from_slice(&declared.to_le_bytes());
    out
}

/// Reader that hands out at most `step` bytes per call.
pub struct TrickleReader<R> {
    inner: R,
    step: usize,
}

impl<R: Read> TrickleReader<R> {
    pub fn new(inner: R, step: usize) -> Self {
        Self {
            inner,
            step: step.max(1),
        }
    }
}

impl<R: Read> Read for TrickleReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.step);
        self.inner.read(&mut buf[..len])
    }
}

/// Reader that fails every call with `kind`.
pub struct FailingReader {
    pub kind: io::ErrorKind,
}

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(self.kind, "injected failure"))
    }
}

use std::io::{self, Read};

/// Reads until `buf` is full or the reader is exhausted, retrying on `Interrupted`.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

pub fn read_exact_or_err<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let read = read_full(reader, buf)?;
    if read != buf.len() {
        return Err(truncated());
    }
    Ok(())
}

pub fn read_u32_le<R: Read + ?Sized>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    read_exact_or_err(reader, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "truncated input")
}

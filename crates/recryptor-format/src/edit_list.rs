use std::io::{self, Write};

/// Applies an edit list to plaintext on its way to `inner`.
///
/// Lengths alternate between bytes to skip and bytes to keep, starting with a
/// skip. After the last entry the rest of the stream is kept when the list
/// ends on a skip (odd count) and dropped when it ends on a keep (even count).
pub struct EditListWriter<W: Write> {
    inner: W,
    lengths: Vec<u64>,
    next: usize,
    remaining: u64,
    keeping: bool,
    written: u64,
}

impl<W: Write> EditListWriter<W> {
    pub fn new(inner: W, lengths: Vec<u64>) -> Self {
        let mut writer = Self {
            inner,
            lengths,
            next: 0,
            remaining: 0,
            keeping: true,
            written: 0,
        };
        writer.advance();
        writer
    }

    /// Bytes forwarded to the inner writer so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// True once no further input can reach the output.
    pub fn is_done(&self) -> bool {
        self.next >= self.lengths.len() && self.remaining == 0 && !self.tail_is_kept()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn advance(&mut self) {
        while self.remaining == 0 && self.next < self.lengths.len() {
            self.remaining = self.lengths[self.next];
            self.keeping = self.next % 2 == 1;
            self.next += 1;
        }
    }

    fn tail_is_kept(&self) -> bool {
        self.lengths.is_empty() || self.lengths.len() % 2 == 1
    }
}

impl<W: Write> Write for EditListWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;

        while !rest.is_empty() {
            self.advance();

            if self.remaining == 0 {
                // Edit list exhausted.
                if self.tail_is_kept() {
                    self.inner.write_all(rest)?;
                    self.written += rest.len() as u64;
                }
                break;
            }

            let take = std::cmp::min(self.remaining, rest.len() as u64) as usize;
            if self.keeping {
                self.inner.write_all(&rest[..take])?;
                self.written += take as u64;
            }
            self.remaining -= take as u64;
            rest = &rest[take..];
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

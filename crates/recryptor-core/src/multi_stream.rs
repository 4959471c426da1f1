use std::fmt;
use std::io::{self, Read, Write};

use tracing::trace;

use crate::error::RecryptorError;

/// Presents an ordered list of byte sources as one continuous read-only stream.
///
/// A read keeps pulling from the current source and moves on to the next one
/// when it is exhausted, so a short read only happens once every source has
/// been drained. Exhausted sources are dropped as soon as they report end of
/// stream. The stream is not seekable and rejects writes.
pub struct MultiStreamReader<'a> {
    sources: Vec<Option<Box<dyn Read + 'a>>>,
    current: usize,
    closed: bool,
}

impl<'a> MultiStreamReader<'a> {
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Read + 'a>>,
    {
        Self {
            sources: sources.into_iter().map(Some).collect(),
            current: 0,
            closed: false,
        }
    }

    /// Header bytes first, then the payload. The common detached-header case.
    pub fn pair<H, P>(header: H, payload: P) -> Self
    where
        H: Read + 'a,
        P: Read + 'a,
    {
        Self::new([
            Box::new(header) as Box<dyn Read + 'a>,
            Box::new(payload) as Box<dyn Read + 'a>,
        ])
    }

    /// Number of sources not yet drained.
    pub fn remaining_sources(&self) -> usize {
        self.sources[self.current.min(self.sources.len())..]
            .iter()
            .filter(|source| source.is_some())
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases every source. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.sources.clear();
        self.current = 0;
        self.closed = true;
        trace!("multi-stream reader closed");
    }

    fn read_into(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        if self.closed {
            return Err(RecryptorError::Closed);
        }

        let mut filled = 0;
        while filled < buf.len() && self.current < self.sources.len() {
            let Some(source) = self.sources[self.current].as_mut() else {
                self.current += 1;
                continue;
            };

            match source.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.sources[self.current] = None;
                    self.current += 1;
                    trace!(source = self.current, "advanced to next source");
                }
                Ok(read) => filled += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                // Bytes already copied are returned first.
                Err(_) if filled > 0 => break,
                Err(err) => return Err(RecryptorError::Io(err)),
            }
        }

        Ok(filled)
    }
}

impl Read for MultiStreamReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(RecryptorError::into_io)
    }
}

impl Write for MultiStreamReader<'_> {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        let err = if self.closed {
            RecryptorError::Closed
        } else {
            RecryptorError::Unsupported("multi-stream reader is read-only".to_string())
        };
        Err(err.into_io())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(RecryptorError::Closed.into_io());
        }
        Ok(())
    }
}

impl fmt::Debug for MultiStreamReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiStreamReader")
            .field("sources", &self.sources.len())
            .field("current", &self.current)
            .field("closed", &self.closed)
            .finish()
    }
}

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecryptorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("I/O operation on closed stream")]
    Closed,
}

impl RecryptorError {
    /// Wraps the error into an `io::Error` so it can cross `Read`/`Write` boundaries.
    pub fn into_io(self) -> io::Error {
        let kind = match &self {
            RecryptorError::Io(err) => err.kind(),
            RecryptorError::Unsupported(_) => io::ErrorKind::Unsupported,
            RecryptorError::Closed => io::ErrorKind::BrokenPipe,
        };
        io::Error::new(kind, self)
    }
}

/// Failure buckets surfaced to callers that need to tell failures apart
/// (the CLI maps each one to its own exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Io,
    KeyFormat,
    Passphrase,
    Format,
    TruncatedStream,
    UnauthorizedPacket,
    SenderAuthentication,
    UnsupportedOperation,
    Crypto,
}

impl ErrorCategory {
    pub fn of_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => ErrorCategory::TruncatedStream,
            io::ErrorKind::Unsupported => ErrorCategory::UnsupportedOperation,
            _ => ErrorCategory::Io,
        }
    }
}

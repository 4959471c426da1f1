#![deny(warnings)]
#![deny(clippy::all)]

pub mod crypto;
pub mod error;
pub mod io_ext;
pub mod multi_stream;
pub mod util;

pub use error::{ErrorCategory, RecryptorError};
pub use multi_stream::MultiStreamReader;
pub use util::{ct_eq, zeroize_bytes};

pub type Result<T> = std::result::Result<T, RecryptorError>;

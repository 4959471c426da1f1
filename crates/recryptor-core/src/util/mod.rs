mod ct_eq;
mod zeroize;

pub use self::ct_eq::ct_eq;
pub use self::zeroize::zeroize_bytes;

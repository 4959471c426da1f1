use zeroize::Zeroize;

/// Wipes decoded key records and other scratch buffers.
pub fn zeroize_bytes(buf: &mut [u8]) {
    buf.zeroize();
}

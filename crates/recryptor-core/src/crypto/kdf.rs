use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::aead::AEAD_KEY_LEN;
use crate::crypto::ids::KdfId;
use crate::crypto::CryptoError;

pub const DEFAULT_SALT_LEN: usize = 16;
pub const SCRYPT_LOG_N: u8 = 14;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;
pub const PBKDF2_DEFAULT_ROUNDS: u32 = 100_000;
pub const BCRYPT_DEFAULT_ROUNDS: u32 = 100;

/// Derives the 32-byte key protecting a private key record.
///
/// `rounds` only matters for PBKDF2 and bcrypt; scrypt records store zero and
/// use fixed cost parameters.
pub fn derive_key(
    kdf: KdfId,
    passphrase: &[u8],
    salt: &[u8],
    rounds: u32,
) -> Result<Zeroizing<[u8; AEAD_KEY_LEN]>, CryptoError> {
    let mut output = Zeroizing::new([0u8; AEAD_KEY_LEN]);

    match kdf {
        KdfId::Scrypt => {
            let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, AEAD_KEY_LEN)
                .map_err(|_| CryptoError::Kdf("invalid scrypt parameters"))?;
            scrypt::scrypt(passphrase, salt, &params, output.as_mut())
                .map_err(|_| CryptoError::Kdf("scrypt output length"))?;
        }
        KdfId::Pbkdf2HmacSha256 => {
            let rounds = if rounds == 0 {
                PBKDF2_DEFAULT_ROUNDS
            } else {
                rounds
            };
            pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, rounds, output.as_mut());
        }
        KdfId::Bcrypt => {
            let rounds = if rounds == 0 {
                BCRYPT_DEFAULT_ROUNDS
            } else {
                rounds
            };
            bcrypt_pbkdf::bcrypt_pbkdf(passphrase, salt, rounds, output.as_mut())
                .map_err(|_| CryptoError::Kdf("invalid bcrypt parameters"))?;
        }
        KdfId::None => {
            return Err(CryptoError::UnsupportedKdf(kdf.name().to_string()));
        }
    }

    Ok(output)
}

pub fn generate_salt(len: usize) -> Zeroizing<Vec<u8>> {
    let mut salt = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(salt.as_mut_slice());
    salt
}

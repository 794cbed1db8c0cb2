//! Passcode and token generation.

use rand::{Rng, RngCore};

/// Lowest and highest codes handed out; six digits with no leading zero.
pub const OTP_CODE_MIN: u32 = 100_000;
pub const OTP_CODE_MAX: u32 = 999_999;

/// Generate a 6-digit code drawn uniformly from [100000, 999999].
pub fn generate_otp_code() -> String {
    let code: u32 = rand::rng().random_range(OTP_CODE_MIN..=OTP_CODE_MAX);
    code.to_string()
}

/// 32 random bytes, hex-encoded.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Opaque value echoed back by the bank connect page.
pub fn generate_link_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

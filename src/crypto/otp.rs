//! One-time passwords for the untrusted handshake.
//!
//! The wallet displays a 6-digit OTP; the user retypes it on the dApp, which
//! compares it against the offer in constant time.

use rand::Rng;
use subtle::ConstantTimeEq;

use crate::core::{OTP_MAX, OTP_MIN};

/// Generate a 6-digit decimal OTP, uniformly sampled from 100000-999999.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX).to_string()
}

/// Constant-time string equality.
///
/// When both strings share a length, the runtime does not depend on the
/// position of the first mismatch. Differing lengths return `false`
/// immediately; length is not a secret here.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OTP_DIGITS;

    #[test]
    fn test_otp_is_six_digits_in_range() {
        for _ in 0..1_000 {
            let otp = generate_otp();
            assert_eq!(otp.len(), OTP_DIGITS);
            let value: u32 = otp.parse().unwrap();
            assert!((OTP_MIN..=OTP_MAX).contains(&value));
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("123456", "123456"));
        assert!(!constant_time_eq("123456", "123457"));
        assert!(!constant_time_eq("123456", "623456"));
        assert!(!constant_time_eq("123456", "12345"));
        assert!(constant_time_eq("", ""));
    }
}

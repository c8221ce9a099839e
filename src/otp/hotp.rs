//! RFC 4226 HOTP and RFC 6238 TOTP code generation.
//!
//! HMAC-SHA1 comes from the RustCrypto `hmac` + `sha1` crates, HMAC-SHA256
//! from `hmac-sha256`.  Both are pure Rust and identical on ESP-IDF and host.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::config::OtpAlgorithm;

/// Largest HMAC output we handle (SHA-256).
const MAX_MAC_LEN: usize = 32;

/// Compute the HMAC of the 8-byte big-endian moving factor.
///
/// Returns the MAC buffer and the number of valid bytes in it.
fn mac(algorithm: OtpAlgorithm, key: &[u8], factor: u64) -> Option<([u8; MAX_MAC_LEN], usize)> {
    let msg = factor.to_be_bytes();
    let mut out = [0u8; MAX_MAC_LEN];
    match algorithm {
        OtpAlgorithm::Sha1 => {
            let mut h = <Hmac<Sha1> as Mac>::new_from_slice(key).ok()?;
            h.update(&msg);
            let tag = h.finalize().into_bytes();
            out[..tag.len()].copy_from_slice(&tag);
            Some((out, tag.len()))
        }
        OtpAlgorithm::Sha256 => {
            out = hmac_sha256::HMAC::mac(msg, key);
            Some((out, MAX_MAC_LEN))
        }
    }
}

/// RFC 4226 §5.3 dynamic truncation.
fn truncate(mac: &[u8]) -> u32 {
    let offset = (mac[mac.len() - 1] & 0x0f) as usize;
    u32::from_be_bytes([
        mac[offset],
        mac[offset + 1],
        mac[offset + 2],
        mac[offset + 3],
    ]) & 0x7fff_ffff
}

/// HOTP value for `(key, counter)` reduced to `digits` decimal digits.
///
/// `digits` must be 6–8; the caller's config validation guarantees it.
pub fn hotp(algorithm: OtpAlgorithm, key: &[u8], counter: u64, digits: u8) -> Option<u32> {
    let (buf, len) = mac(algorithm, key, counter)?;
    Some(truncate(&buf[..len]) % 10u32.pow(u32::from(digits)))
}

/// Time step containing `unix_secs` for the given period.
pub fn time_step(unix_secs: u64, period_secs: u32) -> u64 {
    unix_secs / u64::from(period_secs.max(1))
}

/// TOTP value for the window containing `unix_secs`.
pub fn totp(
    algorithm: OtpAlgorithm,
    key: &[u8],
    unix_secs: u64,
    period_secs: u32,
    digits: u8,
) -> Option<u32> {
    hotp(algorithm, key, time_step(unix_secs, period_secs), digits)
}

/// Zero-padded decimal rendering of a code, exactly `digits` characters long.
pub fn format_code(code: u32, digits: u8) -> heapless::String<8> {
    use core::fmt::Write;
    let mut s = heapless::String::new();
    let _ = write!(s, "{:0width$}", code, width = usize::from(digits));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC4226_KEY: &[u8] = b"12345678901234567890";
    const RFC6238_KEY_SHA256: &[u8] = b"12345678901234567890123456789012";

    #[test]
    fn rfc4226_appendix_d_vectors() {
        let expected = [
            755_224, 287_082, 359_152, 969_429, 338_314, 254_676, 287_922, 162_583, 399_871,
            520_489,
        ];
        for (counter, want) in expected.iter().enumerate() {
            assert_eq!(
                hotp(OtpAlgorithm::Sha1, RFC4226_KEY, counter as u64, 6),
                Some(*want),
                "counter {counter}"
            );
        }
    }

    #[test]
    fn rfc6238_sha1_vectors() {
        let cases = [
            (59, 94_287_082),
            (1_111_111_109, 7_081_804),
            (1_111_111_111, 14_050_471),
            (1_234_567_890, 89_005_924),
            (2_000_000_000, 69_279_037),
        ];
        for (t, want) in cases {
            assert_eq!(totp(OtpAlgorithm::Sha1, RFC4226_KEY, t, 30, 8), Some(want), "t={t}");
        }
    }

    #[test]
    fn rfc6238_sha256_vectors() {
        let cases = [
            (59, 46_119_246),
            (1_111_111_109, 68_084_774),
            (1_111_111_111, 67_062_674),
            (1_234_567_890, 91_819_424),
            (2_000_000_000, 90_698_825),
        ];
        for (t, want) in cases {
            assert_eq!(
                totp(OtpAlgorithm::Sha256, RFC6238_KEY_SHA256, t, 30, 8),
                Some(want),
                "t={t}"
            );
        }
    }

    #[test]
    fn format_code_zero_pads() {
        assert_eq!(format_code(7_081_804, 8).as_str(), "07081804");
        assert_eq!(format_code(42, 6).as_str(), "000042");
        assert_eq!(format_code(755_224, 6).as_str(), "755224");
    }

    #[test]
    fn time_step_boundaries() {
        assert_eq!(time_step(29, 30), 0);
        assert_eq!(time_step(30, 30), 1);
        assert_eq!(time_step(59, 30), 1);
    }
}

//! Fuzz target: `CodeVerifier::verify`
//!
//! Feeds arbitrary submissions, counters and wall-clock values through the
//! HOTP and TOTP verifiers.  HOTP must advance the counter exactly once per
//! attempt (or not at all when exhausted); TOTP must never touch it.
//!
//! cargo fuzz run fuzz_otp_verify

#![no_main]

use blepinpad::config::{PinpadConfig, SecurityMode};
use blepinpad::otp::{CodeVerifier, MovingFactor};
use libfuzzer_sys::fuzz_target;

struct Counter(u32);

impl MovingFactor for Counter {
    fn current(&self) -> u32 {
        self.0
    }

    fn advance(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }
}

fuzz_target!(|input: (u32, u64, u8, &str)| {
    let (start, unix, digits, submitted) = input;
    let digits = 6 + digits % 3;

    for mode in [SecurityMode::Hotp, SecurityMode::Totp] {
        let config = PinpadConfig {
            security_mode: mode,
            secret: "12345678901234567890".into(),
            otp_digits: digits,
            ..Default::default()
        };
        let verifier = CodeVerifier::new(&config);
        let mut counter = Counter(start);
        let _ = verifier.verify(submitted, &mut counter, Some(unix));

        let expected = match mode {
            SecurityMode::Hotp if start == u32::MAX => start,
            SecurityMode::Hotp => start + 1,
            _ => start,
        };
        assert_eq!(counter.0, expected);
    }
});

//! One-time code verification.
//!
//! [`CodeVerifier`] turns a submitted code into a [`Verdict`].  It holds the
//! immutable security configuration only; the moving factor comes from the
//! caller:
//!
//! | Mode     | Moving factor                         | Side effect            |
//! |----------|---------------------------------------|------------------------|
//! | `None`   | —                                     | —                      |
//! | `Static` | —                                     | —                      |
//! | `Hotp`   | [`MovingFactor::current`]             | exactly one `advance()`|
//! | `Totp`   | wall clock / period, ± skew windows   | —                      |
//!
//! Comparisons are constant-time (`subtle`) and require identical length.
//! Malformed submissions (wrong length, non-digits) are plain rejections.

pub mod hotp;

use log::{error, warn};
use subtle::{Choice, ConstantTimeEq};

use crate::config::{OtpAlgorithm, PinpadConfig, SecurityMode};

/// Wall-clock values before 2020-01-01 mean the clock was never synchronised.
pub const MIN_SYNCED_UNIX_SECS: u64 = 1_577_836_800;

/// Outcome of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }

    fn from_choice(c: Choice) -> Self {
        if bool::from(c) {
            Self::Accepted
        } else {
            Self::Rejected
        }
    }
}

/// Accessor for the HOTP counter.
///
/// Implemented by the counter store; the verifier reads the current value
/// and advances it once per attempt.
pub trait MovingFactor {
    /// `false` while the persisted value is unknown.  HOTP then rejects
    /// without advancing.
    fn is_known(&self) -> bool {
        true
    }

    fn current(&self) -> u32;

    /// Advance by one and return the new value.
    fn advance(&mut self) -> u32;
}

/// Stateless verifier over an immutable security configuration.
pub struct CodeVerifier {
    mode: SecurityMode,
    secret: Vec<u8>,
    digits: u8,
    algorithm: OtpAlgorithm,
    period_secs: u32,
    skew_steps: u8,
}

impl CodeVerifier {
    pub fn new(config: &PinpadConfig) -> Self {
        Self {
            mode: config.security_mode,
            secret: config.secret.as_bytes().to_vec(),
            digits: config.otp_digits,
            algorithm: config.otp_algorithm,
            period_secs: config.totp_period_secs,
            skew_steps: config.totp_skew_steps,
        }
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Check `submitted` against the expected code.
    ///
    /// `unix_secs` is only consulted in TOTP mode; `counter` only in HOTP
    /// mode, where it is advanced exactly once whatever the outcome.
    pub fn verify(
        &self,
        submitted: &str,
        counter: &mut impl MovingFactor,
        unix_secs: Option<u64>,
    ) -> Verdict {
        match self.mode {
            SecurityMode::None => Verdict::Accepted,
            SecurityMode::Static => {
                Verdict::from_choice(self.secret.as_slice().ct_eq(submitted.as_bytes()))
            }
            SecurityMode::Hotp => self.verify_hotp(submitted, counter),
            SecurityMode::Totp => self.verify_totp(submitted, unix_secs),
        }
    }

    fn verify_hotp(&self, submitted: &str, counter: &mut impl MovingFactor) -> Verdict {
        if !counter.is_known() {
            error!("otp: HOTP counter not loaded, refusing verification");
            return Verdict::Rejected;
        }
        let current = counter.current();
        if current == u32::MAX {
            error!("otp: HOTP counter exhausted, refusing verification");
            return Verdict::Rejected;
        }

        let verdict = if self.is_well_formed(submitted) {
            self.matches(submitted, u64::from(current))
        } else {
            Verdict::Rejected
        };

        counter.advance();
        verdict
    }

    fn verify_totp(&self, submitted: &str, unix_secs: Option<u64>) -> Verdict {
        let Some(now) = unix_secs.filter(|t| *t >= MIN_SYNCED_UNIX_SECS) else {
            warn!("otp: wall clock not synchronised, rejecting TOTP");
            return Verdict::Rejected;
        };
        if !self.is_well_formed(submitted) {
            return Verdict::Rejected;
        }

        let step = hotp::time_step(now, self.period_secs);
        let skew = u64::from(self.skew_steps);
        let mut hit = Choice::from(0);
        // Every window is evaluated so the timing does not reveal which one matched.
        for s in step.saturating_sub(skew)..=step.saturating_add(skew) {
            hit |= self.code_eq(submitted, s);
        }
        Verdict::from_choice(hit)
    }

    fn matches(&self, submitted: &str, factor: u64) -> Verdict {
        Verdict::from_choice(self.code_eq(submitted, factor))
    }

    fn code_eq(&self, submitted: &str, factor: u64) -> Choice {
        match hotp::hotp(self.algorithm, &self.secret, factor, self.digits) {
            Some(code) => {
                let expected = hotp::format_code(code, self.digits);
                expected.as_bytes().ct_eq(submitted.as_bytes())
            }
            None => Choice::from(0),
        }
    }

    fn is_well_formed(&self, submitted: &str) -> bool {
        submitted.len() == usize::from(self.digits) && submitted.bytes().all(|b| b.is_ascii_digit())
    }
}

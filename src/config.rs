//! Pinpad configuration parameters
//!
//! Everything the device needs at setup time: the security mode and shared
//! secret, one-time-code parameters, debounce hold, and the user-commands
//! table.  Values are compiled-in defaults that can be overridden from NVS.
//!
//! The configuration is immutable once [`PinpadService`] is constructed.
//!
//! [`PinpadService`]: crate::app::service::PinpadService

use serde::{Deserialize, Serialize};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};

/// Maximum length of a user id, in bytes.
pub const MAX_USER_ID_LEN: usize = 64;
/// Maximum length of a command id, in bytes.
pub const MAX_CMD_ID_LEN: usize = 32;
/// Maximum number of entries in the user-commands table.
pub const MAX_USER_COMMANDS: usize = 16;

/// How submitted codes are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SecurityMode {
    /// Every submission is accepted. Authentication is disabled.
    None = 0x00,
    /// RFC 4226 counter-based codes.
    Hotp = 0x01,
    /// RFC 6238 time-based codes.
    Totp = 0x02,
    /// Fixed passcode.
    Static = 0x03,
}

impl SecurityMode {
    /// Label published on the security-mode characteristic.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hotp => "hotp",
            Self::Totp => "totp",
            Self::Static => "static",
        }
    }

    /// Whether this mode needs a non-empty secret.
    pub fn requires_secret(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl core::str::FromStr for SecurityMode {
    type Err = ConfigError;

    /// Parse the label published on the security-mode characteristic.
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "none" => Ok(Self::None),
            "hotp" => Ok(Self::Hotp),
            "totp" => Ok(Self::Totp),
            "static" => Ok(Self::Static),
            _ => Err(ConfigError::ValidationFailed("unknown security mode")),
        }
    }
}

/// HMAC hash used for HOTP/TOTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OtpAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

/// One entry of the user-commands table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCommand {
    pub id: String,
    pub label: String,
}

impl UserCommand {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Core pinpad configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinpadConfig {
    // --- Security ---
    pub security_mode: SecurityMode,
    /// Shared secret (HMAC key for HOTP/TOTP, passcode for `Static`).
    /// Stored separately in the credential namespace, never in the config blob.
    #[serde(skip)]
    pub secret: String,
    /// Number of decimal digits in a one-time code (6–8).
    pub otp_digits: u8,
    pub otp_algorithm: OtpAlgorithm,
    /// TOTP time-step length (seconds)
    pub totp_period_secs: u32,
    /// Adjacent TOTP windows accepted on either side of the current one.
    /// 0 = current window only.
    pub totp_skew_steps: u8,

    // --- Timing ---
    /// How long `Accepted`/`Rejected` is held before reverting to `Idle` (ms)
    pub hold_ms: u32,
    /// Control loop poll interval (ms)
    pub poll_interval_ms: u32,

    // --- Peripheral ---
    /// Advertised BLE device name
    pub device_name: String,
    /// Drive the status indicator output
    pub status_indicator: bool,

    // --- Automation ---
    pub user_commands: Vec<UserCommand>,
}

impl Default for PinpadConfig {
    fn default() -> Self {
        Self {
            security_mode: SecurityMode::None,
            secret: String::new(),
            otp_digits: 6,
            otp_algorithm: OtpAlgorithm::Sha1,
            totp_period_secs: 30,
            totp_skew_steps: 1,

            hold_ms: 500,
            poll_interval_ms: 16,

            device_name: "ble-pinpad".into(),
            status_indicator: true,

            user_commands: Vec::new(),
        }
    }
}

impl PinpadConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security_mode.requires_secret() && self.secret.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "secret must be set for hotp/totp/static modes",
            ));
        }
        if !self.secret.is_ascii() {
            return Err(ConfigError::ValidationFailed("secret must be ASCII"));
        }
        if !(6..=8).contains(&self.otp_digits) {
            return Err(ConfigError::ValidationFailed("otp_digits must be 6–8"));
        }
        if !(1..=300).contains(&self.totp_period_secs) {
            return Err(ConfigError::ValidationFailed(
                "totp_period_secs must be 1–300",
            ));
        }
        if self.totp_skew_steps > 2 {
            return Err(ConfigError::ValidationFailed("totp_skew_steps must be 0–2"));
        }
        if !(100..=10_000).contains(&self.hold_ms) {
            return Err(ConfigError::ValidationFailed("hold_ms must be 100–10000"));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms >= self.hold_ms {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_ms must be non-zero and below hold_ms",
            ));
        }
        if self.device_name.is_empty() || self.device_name.len() > 24 {
            return Err(ConfigError::ValidationFailed(
                "device_name must be 1–24 bytes",
            ));
        }
        if self.user_commands.len() > MAX_USER_COMMANDS {
            return Err(ConfigError::ValidationFailed("too many user commands"));
        }
        for (i, cmd) in self.user_commands.iter().enumerate() {
            if cmd.id.is_empty() || cmd.id.len() > MAX_CMD_ID_LEN {
                return Err(ConfigError::ValidationFailed(
                    "user command id must be 1–32 bytes",
                ));
            }
            if self.user_commands[..i].iter().any(|c| c.id == cmd.id) {
                return Err(ConfigError::ValidationFailed("duplicate user command id"));
            }
        }
        Ok(())
    }

    /// Boot-time config.  Only an absent config falls back to `provision`
    /// (which is then persisted); read and decode errors are returned so a
    /// damaged store never boots with the default `None` mode.
    pub fn load_or_provision(
        port: &mut impl ConfigPort,
        provision: impl FnOnce() -> PinpadConfig,
    ) -> Result<PinpadConfig, ConfigError> {
        match port.load() {
            Ok(cfg) => {
                info!("config: loaded from storage");
                Ok(cfg)
            }
            Err(ConfigError::NotFound) => {
                info!("config: none stored, provisioning");
                let cfg = provision();
                if let Err(e) = port.save(&cfg) {
                    warn!("config: provisioned config not persisted ({})", e);
                }
                Ok(cfg)
            }
            Err(e) => Err(e),
        }
    }

    /// Look up a user command by id.
    pub fn user_command(&self, id: &str) -> Option<&UserCommand> {
        self.user_commands.iter().find(|c| c.id == id)
    }

    /// JSON rendering of the user-commands table for the user-cmd characteristic.
    pub fn user_commands_json(&self) -> String {
        serde_json::to_string(&self.user_commands).unwrap_or_else(|_| "[]".into())
    }
}

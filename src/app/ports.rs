//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ PinpadService (domain)
//! ```
//!
//! Driven adapters (NVS, BLE characteristics, status indicator, clocks)
//! implement these traits.  The [`PinpadService`](super::service::PinpadService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! The BLE boundary is deliberately split in two: inbound payloads arrive
//! through [`crate::rpc::channels::INBOUND`], outbound values leave through
//! [`PublishPort`].  No single object is both.
//!
//! ## Security notes
//!
//! - **CounterPort** writes MUST be durable when `save` returns `Ok`.
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **StoragePort** implementations SHOULD encrypt the `auth` namespace.

use crate::config::{PinpadConfig, SecurityMode};
use crate::fsm::StateId;

// ───────────────────────────────────────────────────────────────
// Counter port (driven adapter: domain ↔ persisted HOTP counter)
// ───────────────────────────────────────────────────────────────

/// Persistence for the monotonic HOTP counter.
pub trait CounterPort {
    /// Load the persisted counter.  Returns `Ok(None)` when nothing has
    /// been stored yet.
    fn load_counter(&self) -> Result<Option<u32>, StorageError>;

    /// Durably store `value`.  Only returns `Ok` after the write is committed.
    fn save_counter(&mut self, value: u32) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: timer → domain)
// ───────────────────────────────────────────────────────────────

/// Time sources used by the state machine and the TOTP verifier.
pub trait ClockPort {
    /// Milliseconds since boot.  Monotonic.
    fn now_ms(&self) -> u64;

    /// Seconds since the Unix epoch, or `None` when the wall clock has not
    /// been synchronised yet.
    fn unix_time_secs(&self) -> Option<u64>;
}

// ───────────────────────────────────────────────────────────────
// Indicator port (driven adapter: domain → output pin)
// ───────────────────────────────────────────────────────────────

/// Binary status indicator (LED, relay, buzzer…).
pub trait IndicatorPort {
    fn set_indicator(&mut self, on: bool);
}

/// Placeholder for builds without a status indicator binding.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl IndicatorPort for NoIndicator {
    fn set_indicator(&mut self, _on: bool) {}
}

// ───────────────────────────────────────────────────────────────
// Publish port (driven adapter: domain → GATT characteristic values)
// ───────────────────────────────────────────────────────────────

/// Outbound observable values.  Each call replaces the characteristic value
/// and notifies subscribed peers where the characteristic supports it.
pub trait PublishPort {
    /// Status characteristic: the state as a single byte.
    fn publish_status(&mut self, state: StateId);

    /// Selected user id (empty when cleared).
    fn publish_user_id(&mut self, user_id: &str);

    /// Echo of the last submitted or invoked command id (empty when cleared).
    fn publish_cmd(&mut self, cmd_id: &str);

    /// Serialized user-commands table (empty when cleared).
    fn publish_user_commands(&mut self, table: &str);

    /// Diagnostic read-only security mode.
    fn publish_security_mode(&mut self, mode: SecurityMode);

    /// Diagnostic read-only HOTP counter.
    fn publish_hotp_counter(&mut self, counter: u32);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists pinpad configuration.
///
/// # Security
///
/// Implementations MUST validate config values before persisting, and MUST
/// keep the secret out of the plain config blob.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`ConfigError::NotFound`] if no stored config exists.
    fn load(&self) -> Result<PinpadConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &PinpadConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// # Security
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic, with no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] and [`CounterPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored value has an unexpected size or layout.
    Corrupted,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored value corrupted"),
        }
    }
}

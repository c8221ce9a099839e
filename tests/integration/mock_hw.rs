//! Mock ports for integration tests.
//!
//! Records every outbound call so tests can assert on the full history
//! without a BLE stack, NVS partition or GPIO.

#![allow(dead_code)]

use std::cell::Cell;

use blepinpad::app::ports::{
    ClockPort, CounterPort, IndicatorPort, PublishPort, StorageError,
};
use blepinpad::app::service::PinpadService;
use blepinpad::config::{PinpadConfig, SecurityMode, UserCommand};
use blepinpad::fsm::StateId;
use blepinpad::otp::hotp;

/// RFC 4226 Appendix D test secret.
pub const SECRET: &str = "12345678901234567890";

/// Passcode for `Static` mode fixtures.
pub const PASSCODE: &str = "2468";

// ── MockCounter ───────────────────────────────────────────────

#[derive(Default)]
pub struct MockCounter {
    pub stored: Option<u32>,
    pub writes: Vec<u32>,
    pub fail_writes: bool,
    pub fail_reads: bool,
}

impl MockCounter {
    pub fn at(value: u32) -> Self {
        Self {
            stored: Some(value),
            ..Default::default()
        }
    }
}

impl CounterPort for MockCounter {
    fn load_counter(&self) -> Result<Option<u32>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::IoError);
        }
        Ok(self.stored)
    }

    fn save_counter(&mut self, value: u32) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.stored = Some(value);
        self.writes.push(value);
        Ok(())
    }
}

// ── MockPublisher ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockPublisher {
    pub status: Vec<StateId>,
    pub user_id: String,
    pub cmd: String,
    pub user_commands: String,
    pub security_mode: Option<SecurityMode>,
    pub hotp_counter: Option<u32>,
}

impl MockPublisher {
    pub fn last_status(&self) -> Option<StateId> {
        self.status.last().copied()
    }
}

impl PublishPort for MockPublisher {
    fn publish_status(&mut self, state: StateId) {
        self.status.push(state);
    }

    fn publish_user_id(&mut self, user_id: &str) {
        self.user_id = user_id.into();
    }

    fn publish_cmd(&mut self, cmd_id: &str) {
        self.cmd = cmd_id.into();
    }

    fn publish_user_commands(&mut self, table: &str) {
        self.user_commands = table.into();
    }

    fn publish_security_mode(&mut self, mode: SecurityMode) {
        self.security_mode = Some(mode);
    }

    fn publish_hotp_counter(&mut self, counter: u32) {
        self.hotp_counter = Some(counter);
    }
}

// ── MockIndicator ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockIndicator {
    pub levels: Vec<bool>,
}

impl MockIndicator {
    pub fn is_on(&self) -> bool {
        self.levels.last().copied().unwrap_or(false)
    }
}

impl IndicatorPort for MockIndicator {
    fn set_indicator(&mut self, on: bool) {
        self.levels.push(on);
    }
}

// ── MockClock ─────────────────────────────────────────────────

pub struct MockClock {
    ms: Cell<u64>,
    unix: Cell<Option<u64>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            ms: Cell::new(0),
            unix: Cell::new(None),
        }
    }

    /// Monotonic clock at `ms`, wall clock at `unix` seconds.
    pub fn at(ms: u64, unix: Option<u64>) -> Self {
        Self {
            ms: Cell::new(ms),
            unix: Cell::new(unix),
        }
    }

    pub fn set_ms(&self, ms: u64) {
        self.ms.set(ms);
    }

    pub fn advance_ms(&self, delta: u64) {
        self.ms.set(self.ms.get() + delta);
    }

    pub fn set_unix(&self, secs: Option<u64>) {
        self.unix.set(secs);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for MockClock {
    fn now_ms(&self) -> u64 {
        self.ms.get()
    }

    fn unix_time_secs(&self) -> Option<u64> {
        self.unix.get()
    }
}

// ── Fixtures ──────────────────────────────────────────────────

pub type TestPinpad = PinpadService<MockCounter, MockPublisher, MockIndicator>;

pub fn config(mode: SecurityMode) -> PinpadConfig {
    PinpadConfig {
        security_mode: mode,
        secret: SECRET.into(),
        user_commands: vec![
            UserCommand::new("open", "Open door"),
            UserCommand::new("lock", "Lock door"),
        ],
        ..Default::default()
    }
}

pub fn static_config() -> PinpadConfig {
    PinpadConfig {
        secret: PASSCODE.into(),
        ..config(SecurityMode::Static)
    }
}

/// Set up and started pinpad.
pub fn pinpad(config: PinpadConfig, counter: MockCounter) -> TestPinpad {
    let mut p = PinpadService::new(
        config,
        counter,
        MockPublisher::default(),
        MockIndicator::default(),
    );
    p.setup().unwrap();
    p.start();
    p
}

/// Expected HOTP code for the test secret.
pub fn hotp_code(counter: u32) -> String {
    let code = hotp::hotp(
        blepinpad::config::OtpAlgorithm::Sha1,
        SECRET.as_bytes(),
        u64::from(counter),
        6,
    )
    .unwrap();
    hotp::format_code(code, 6).to_string()
}

// ── Payload builders ──────────────────────────────────────────

pub fn select_user(user: &str) -> Vec<u8> {
    let mut p = vec![0x01];
    p.extend_from_slice(user.as_bytes());
    p
}

pub fn submit_pin(pin: &str) -> Vec<u8> {
    submit_pin_for(pin, "")
}

pub fn submit_pin_for(pin: &str, cmd_id: &str) -> Vec<u8> {
    let mut p = vec![0x02, pin.len() as u8];
    p.extend_from_slice(pin.as_bytes());
    p.extend_from_slice(cmd_id.as_bytes());
    p
}

pub fn request_user_commands() -> Vec<u8> {
    vec![0x03]
}

pub fn invoke(cmd_id: &str) -> Vec<u8> {
    let mut p = vec![0x04];
    p.extend_from_slice(cmd_id.as_bytes());
    p
}

//! HOTP counter behaviour across verification attempts and storage faults.

use blepinpad::adapters::nvs::NvsAdapter;
use blepinpad::app::ports::{ConfigError, CounterPort, StoragePort};
use blepinpad::app::service::PinpadService;
use blepinpad::config::{PinpadConfig, SecurityMode};
use blepinpad::fsm::StateId;

use crate::mock_hw::*;

fn submit(p: &mut TestPinpad, clock: &MockClock, code: &str) {
    p.ingest(&select_user("alice"), clock);
    p.ingest(&submit_pin(code), clock);
}

fn settle(p: &mut TestPinpad, clock: &MockClock) {
    clock.advance_ms(500);
    p.poll(clock);
    assert_eq!(p.state(), StateId::Idle);
}

#[test]
fn valid_code_advances_and_persists() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::at(41));
    let clock = MockClock::new();

    submit(&mut p, &clock, &hotp_code(41));
    assert!(p.is_accepted());
    assert_eq!(p.hotp_counter(), 42);
    assert_eq!(p.counter_port().writes, [42]);
    assert_eq!(p.publisher().hotp_counter, Some(42));
}

#[test]
fn stale_code_is_rejected_and_still_advances() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::at(42));
    let clock = MockClock::new();

    submit(&mut p, &clock, &hotp_code(41));
    assert!(p.is_rejected());
    assert_eq!(p.hotp_counter(), 43);
}

#[test]
fn replayed_code_is_rejected() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::at(3));
    let clock = MockClock::new();
    let code = hotp_code(3);

    submit(&mut p, &clock, &code);
    assert!(p.is_accepted());
    settle(&mut p, &clock);

    submit(&mut p, &clock, &code);
    assert!(p.is_rejected());
    assert_eq!(p.hotp_counter(), 5);
}

#[test]
fn malformed_code_consumes_a_counter_value() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::at(10));
    let clock = MockClock::new();

    submit(&mut p, &clock, "12ab56");
    assert!(p.is_rejected());
    assert_eq!(p.hotp_counter(), 11);
    settle(&mut p, &clock);

    submit(&mut p, &clock, "1234567");
    assert!(p.is_rejected());
    assert_eq!(p.hotp_counter(), 12);
}

#[test]
fn pin_without_user_does_not_touch_counter() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::at(10));
    let clock = MockClock::new();
    p.ingest(&submit_pin(&hotp_code(10)), &clock);
    assert_eq!(p.state(), StateId::Idle);
    assert_eq!(p.hotp_counter(), 10);
    assert!(p.counter_port().writes.is_empty());
}

#[test]
fn missing_counter_starts_at_zero() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::default());
    let clock = MockClock::new();
    assert_eq!(p.hotp_counter(), 0);
    submit(&mut p, &clock, &hotp_code(0));
    assert!(p.is_accepted());
}

#[test]
fn exhausted_counter_rejects_without_wrapping() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::at(u32::MAX));
    let clock = MockClock::new();

    submit(&mut p, &clock, &hotp_code(u32::MAX));
    assert!(p.is_rejected());
    assert_eq!(p.hotp_counter(), u32::MAX);
    assert!(p.counter_port().writes.is_empty());
}

#[test]
fn failed_write_is_retried_on_poll() {
    let mut p = pinpad(
        config(SecurityMode::Hotp),
        MockCounter {
            stored: Some(7),
            fail_writes: true,
            ..Default::default()
        },
    );
    let clock = MockClock::new();

    submit(&mut p, &clock, &hotp_code(7));
    // The verdict stands even though the new value is not durable yet.
    assert!(p.is_accepted());
    assert_eq!(p.hotp_counter(), 8);
    assert!(p.counter_dirty());

    p.poll(&clock);
    assert!(p.counter_dirty());

    p.counter_port_mut().fail_writes = false;
    p.poll(&clock);
    assert!(!p.counter_dirty());
    assert_eq!(p.counter_port().stored, Some(8));
}

#[test]
fn non_hotp_modes_never_write_the_counter() {
    for mode in [SecurityMode::None, SecurityMode::Static, SecurityMode::Totp] {
        let cfg = if mode == SecurityMode::Static {
            static_config()
        } else {
            config(mode)
        };
        let mut p = pinpad(cfg, MockCounter::at(4));
        let clock = MockClock::at(0, Some(2_000_000_000));
        submit(&mut p, &clock, "123456");
        settle(&mut p, &clock);
        assert_eq!(p.hotp_counter(), 4, "{mode:?}");
        assert!(p.counter_port().writes.is_empty(), "{mode:?}");
    }
}

#[test]
fn nvs_adapter_backs_the_counter() {
    let mut p = PinpadService::new(
        config(SecurityMode::Hotp),
        NvsAdapter::new().unwrap(),
        MockPublisher::default(),
        MockIndicator::default(),
    );
    p.setup().unwrap();
    p.start();
    let clock = MockClock::new();

    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin(&hotp_code(0)), &clock);
    assert!(p.is_accepted());
    assert_eq!(p.counter_port().load_counter(), Ok(Some(1)));
}

#[test]
fn unreadable_counter_refuses_codes_until_read_succeeds() {
    let mut p = pinpad(
        config(SecurityMode::Hotp),
        MockCounter {
            stored: Some(41),
            fail_reads: true,
            ..Default::default()
        },
    );
    let clock = MockClock::new();
    assert_eq!(p.publisher().hotp_counter, None);

    // Code for counter 0 was used long ago and must not be replayable.
    submit(&mut p, &clock, &hotp_code(0));
    assert!(p.is_rejected());
    settle(&mut p, &clock);
    submit(&mut p, &clock, &hotp_code(41));
    assert!(p.is_rejected());
    assert!(p.counter_port().writes.is_empty());
    assert_eq!(p.counter_port().stored, Some(41));
    settle(&mut p, &clock);

    p.counter_port_mut().fail_reads = false;
    p.poll(&clock);
    assert_eq!(p.hotp_counter(), 41);
    assert_eq!(p.publisher().hotp_counter, Some(41));

    submit(&mut p, &clock, &hotp_code(41));
    assert!(p.is_accepted());
    assert_eq!(p.counter_port().writes, [42]);
}

#[test]
fn corrupted_config_blob_does_not_fall_back_to_defaults() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write("pinpad", "config", &[0xff; 8]).unwrap();

    let got = PinpadConfig::load_or_provision(&mut nvs, PinpadConfig::default);
    assert_eq!(got.map(|c| c.security_mode), Err(ConfigError::Corrupted));
}


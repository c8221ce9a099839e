//! End-to-end flows: payload bytes → FSM → published values and callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use blepinpad::config::{OtpAlgorithm, PinpadConfig, SecurityMode};
use blepinpad::fsm::StateId;
use blepinpad::otp::hotp;
use blepinpad::rpc::channels::LinkEvent;

use crate::mock_hw::*;

const RFC6238_T: u64 = 2_000_000_000;

fn totp_code(unix: u64) -> String {
    let code = hotp::totp(OtpAlgorithm::Sha1, SECRET.as_bytes(), unix, 30, 6).unwrap();
    hotp::format_code(code, 6).to_string()
}

// ── Setup publishes the initial values ───────────────────────

#[test]
fn setup_publishes_initial_characteristics() {
    let p = pinpad(config(SecurityMode::Hotp), MockCounter::at(7));
    let publ = p.publisher();
    assert_eq!(publ.security_mode, Some(SecurityMode::Hotp));
    assert_eq!(publ.hotp_counter, Some(7));
    assert_eq!(publ.status, [StateId::Stopped, StateId::Idle]);
    assert_eq!(publ.user_id, "");
    assert_eq!(publ.cmd, "");
}

// ── Select → submit → accepted → hold → idle ─────────────────

#[test]
fn accepted_pin_holds_then_reverts_to_idle() {
    let mut p = pinpad(static_config(), MockCounter::default());
    let clock = MockClock::new();

    p.ingest(&select_user("alice"), &clock);
    assert_eq!(p.get_userid(), "alice");
    assert_eq!(p.publisher().user_id, "alice");

    p.ingest(&submit_pin_for(PASSCODE, "open"), &clock);
    assert!(p.is_accepted());
    assert_eq!(p.get_cmd(), "open");
    assert!(p.indicator().is_on());

    clock.set_ms(499);
    p.poll(&clock);
    assert!(p.is_accepted());

    clock.set_ms(500);
    p.poll(&clock);
    assert_eq!(p.state(), StateId::Idle);
    assert_eq!(p.get_userid(), "");
    assert_eq!(p.get_cmd(), "");
    assert_eq!(p.publisher().user_id, "");
    assert!(!p.indicator().is_on());
}

#[test]
fn rejected_pin_holds_then_reverts_to_idle() {
    let mut p = pinpad(static_config(), MockCounter::default());
    let clock = MockClock::new();

    p.ingest(&select_user("bob"), &clock);
    p.ingest(&submit_pin("0000"), &clock);
    assert!(p.is_rejected());
    assert_eq!(p.publisher().last_status(), Some(StateId::Rejected));
    assert!(!p.indicator().is_on());

    clock.advance_ms(500);
    p.poll(&clock);
    assert_eq!(p.state(), StateId::Idle);
}

#[test]
fn hold_is_measured_from_the_verdict() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    let clock = MockClock::at(10_000, None);

    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin("1"), &clock);
    clock.set_ms(10_499);
    p.poll(&clock);
    assert!(p.is_accepted());
    clock.set_ms(10_500);
    p.poll(&clock);
    assert_eq!(p.state(), StateId::Idle);
}

// ── Commands outside their state are dropped ─────────────────

#[test]
fn submit_pin_outside_idle_is_ignored() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::at(0));
    let clock = MockClock::new();

    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin(&hotp_code(0)), &clock);
    assert!(p.is_accepted());
    assert_eq!(p.hotp_counter(), 1);

    p.ingest(&submit_pin(&hotp_code(1)), &clock);
    assert!(p.is_accepted());
    assert_eq!(p.hotp_counter(), 1);
}

#[test]
fn select_user_during_hold_is_ignored() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    let clock = MockClock::new();
    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin("1"), &clock);
    p.ingest(&select_user("mallory"), &clock);
    assert_eq!(p.get_userid(), "alice");
}

#[test]
fn selecting_again_replaces_the_user() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    let clock = MockClock::new();
    p.ingest(&select_user("alice"), &clock);
    p.ingest(&select_user("bob"), &clock);
    assert_eq!(p.get_userid(), "bob");
}

#[test]
fn stopped_pinpad_ignores_everything() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    let clock = MockClock::new();
    p.stop();
    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin("1"), &clock);
    clock.advance_ms(10_000);
    p.poll(&clock);
    assert_eq!(p.state(), StateId::Stopped);
    assert_eq!(p.get_userid(), "");
}

#[test]
fn restart_after_stop_returns_to_idle() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    p.stop();
    p.start();
    assert_eq!(p.state(), StateId::Idle);
}

#[test]
fn malformed_payloads_leave_state_untouched() {
    let mut p = pinpad(config(SecurityMode::Hotp), MockCounter::at(5));
    let clock = MockClock::new();
    p.ingest(&select_user("alice"), &clock);

    let bad_payloads: [&[u8]; 6] = [&[], &[0x7f], &[0x02], &[0x02, 0x00], &[0x02, 0x09, b'1'], &[0x01]];
    for bad in bad_payloads {
        p.ingest(bad, &clock);
        assert_eq!(p.state(), StateId::Idle);
        assert_eq!(p.incoming_len(), 0);
    }
    assert_eq!(p.hotp_counter(), 5);
    assert_eq!(p.get_userid(), "alice");
}

#[test]
fn oversize_payload_is_dropped() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    let clock = MockClock::new();
    let mut big = select_user("alice");
    big.resize(300, b'a');
    p.ingest(&big, &clock);
    assert_eq!(p.incoming_len(), 0);
    assert_eq!(p.get_userid(), "");
}

// ── TOTP ──────────────────────────────────────────────────────

#[test]
fn totp_accepts_current_and_adjacent_windows() {
    let mut cfg = config(SecurityMode::Totp);
    cfg.totp_skew_steps = 1;
    let mut p = pinpad(cfg, MockCounter::at(9));
    let clock = MockClock::at(0, Some(RFC6238_T));

    for (i, unix) in [RFC6238_T, RFC6238_T - 30, RFC6238_T + 30].into_iter().enumerate() {
        p.ingest(&select_user("alice"), &clock);
        p.ingest(&submit_pin(&totp_code(unix)), &clock);
        assert!(p.is_accepted(), "window {i} should be accepted");
        clock.advance_ms(500);
        p.poll(&clock);
    }

    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin(&totp_code(RFC6238_T + 90)), &clock);
    assert!(p.is_rejected());

    // The counter belongs to HOTP only.
    assert_eq!(p.hotp_counter(), 9);
    assert!(p.counter_port().writes.is_empty());
}

#[test]
fn totp_with_unsynced_clock_rejects() {
    let mut p = pinpad(config(SecurityMode::Totp), MockCounter::default());
    let clock = MockClock::at(0, None);
    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin(&totp_code(RFC6238_T)), &clock);
    assert!(p.is_rejected());

    clock.advance_ms(500);
    p.poll(&clock);
    clock.set_unix(Some(60));
    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin(&totp_code(60)), &clock);
    assert!(p.is_rejected());
}

#[test]
fn eight_digit_sha256_codes() {
    let cfg = PinpadConfig {
        otp_digits: 8,
        otp_algorithm: OtpAlgorithm::Sha256,
        ..config(SecurityMode::Totp)
    };
    let mut p = pinpad(cfg, MockCounter::default());
    let clock = MockClock::at(0, Some(RFC6238_T));
    let code = hotp::totp(OtpAlgorithm::Sha256, SECRET.as_bytes(), RFC6238_T, 30, 8).unwrap();

    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin(&hotp::format_code(code, 8)), &clock);
    assert!(p.is_accepted());
}

// ── None mode ─────────────────────────────────────────────────

#[test]
fn none_mode_accepts_any_pin() {
    let mut p = pinpad(PinpadConfig::default(), MockCounter::default());
    let clock = MockClock::new();
    for pin in ["1", "abc", "0000000000000000"] {
        p.ingest(&select_user("guest"), &clock);
        p.ingest(&submit_pin(pin), &clock);
        assert!(p.is_accepted(), "pin {pin:?}");
        clock.advance_ms(500);
        p.poll(&clock);
    }
}

// ── Disconnect ────────────────────────────────────────────────

#[test]
fn disconnect_while_idle_clears_selection() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    let clock = MockClock::new();
    p.on_link_event(LinkEvent::Connected);
    p.ingest(&select_user("alice"), &clock);
    p.on_link_event(LinkEvent::Disconnected);
    assert_eq!(p.get_userid(), "");
    assert_eq!(p.publisher().user_id, "");
    assert_eq!(p.state(), StateId::Idle);
}

#[test]
fn disconnect_does_not_cut_the_hold_short() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    let clock = MockClock::new();
    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin("1"), &clock);
    p.on_link_event(LinkEvent::Disconnected);
    assert!(p.is_accepted());
    clock.set_ms(500);
    p.poll(&clock);
    assert_eq!(p.state(), StateId::Idle);
}

// ── User commands ─────────────────────────────────────────────

#[test]
fn user_commands_table_and_invocation() {
    let mut p = pinpad(config(SecurityMode::None), MockCounter::default());
    let clock = MockClock::new();
    let invoked = Rc::new(RefCell::new(Vec::<String>::new()));
    {
        let invoked = invoked.clone();
        p.callbacks()
            .on_user_command(move |c| invoked.borrow_mut().push(c.into()));
    }

    p.ingest(&request_user_commands(), &clock);
    assert!(p.publisher().user_commands.contains(r#""id":"lock""#));

    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin("1"), &clock);
    p.ingest(&invoke("lock"), &clock);
    assert_eq!(*invoked.borrow(), ["lock"]);
    assert_eq!(p.publisher().cmd, "lock");
    assert!(p.is_accepted());
}

// ── Callbacks ─────────────────────────────────────────────────

#[test]
fn state_callbacks_see_updated_session() {
    let mut p = pinpad(static_config(), MockCounter::default());
    let clock = MockClock::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = seen.clone();
        p.callbacks().on_state_changed(move |s| {
            seen.borrow_mut()
                .push((s.state(), s.user_id().to_string(), s.cmd_id().to_string()));
        });
    }
    let accepted = Rc::new(RefCell::new(Vec::new()));
    {
        let accepted = accepted.clone();
        p.callbacks()
            .on_accepted(move |u, c| accepted.borrow_mut().push(format!("{u}/{c}")));
    }
    let selected = Rc::new(RefCell::new(Vec::<String>::new()));
    {
        let selected = selected.clone();
        p.callbacks()
            .on_user_selected(move |u| selected.borrow_mut().push(u.into()));
    }

    p.ingest(&select_user("alice"), &clock);
    p.ingest(&submit_pin_for(PASSCODE, "open"), &clock);
    clock.set_ms(500);
    p.poll(&clock);

    assert_eq!(*selected.borrow(), ["alice"]);
    assert_eq!(*accepted.borrow(), ["alice/open"]);
    assert_eq!(
        *seen.borrow(),
        [
            (StateId::Accepted, "alice".to_string(), "open".to_string()),
            (StateId::Idle, String::new(), String::new()),
        ]
    );
}

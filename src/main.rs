//! BLE Pinpad Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter        BleAdapter       SystemClock   Indicator    │
//! │  (Config+Counter)  (PublishPort)    (ClockPort)   (GPIO)       │
//! │                                                                │
//! │  ── GATTS callback ──▶ INBOUND / LINK_EVENTS channels ──▶      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            PinpadService (pure logic)                  │    │
//! │  │  FSM · CodeVerifier · CounterStore · CallbackHub       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, PinDriver};

use blepinpad::adapters::ble::BleAdapter;
use blepinpad::adapters::log_sink;
use blepinpad::adapters::nvs::NvsAdapter;
use blepinpad::adapters::time::SystemClock;
use blepinpad::app::ports::ClockPort;
use blepinpad::app::service::PinpadService;
use blepinpad::config::{PinpadConfig, SecurityMode};
use blepinpad::drivers::status_indicator::StatusIndicator;
use blepinpad::error::Error;
use blepinpad::pins;
use blepinpad::rpc::channels::{INBOUND, LINK_EVENTS};

/// First-boot provisioning baked in at build time.  Without
/// `PINPAD_SECURITY_MODE` the device provisions mode `none`.
fn provisioned_defaults() -> PinpadConfig {
    let mut config = PinpadConfig::default();
    match option_env!("PINPAD_SECURITY_MODE") {
        Some(mode) => match mode.parse::<SecurityMode>() {
            Ok(m) => config.security_mode = m,
            Err(e) => warn!("PINPAD_SECURITY_MODE ignored: {}", e),
        },
        None => warn!("PINPAD_SECURITY_MODE unset, provisioning mode 'none'"),
    }
    if let Some(secret) = option_env!("PINPAD_SECRET") {
        config.secret = secret.into();
    }
    config
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  BLE Pinpad v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Persistence + config ───────────────────────────────
    let mut nvs = NvsAdapter::new().map_err(|e| {
        log::error!("NVS init failed: {}", e);
        Error::Init("nvs")
    })?;
    // A store that exists but cannot be read must not fall back to the
    // default mode.
    let config = PinpadConfig::load_or_provision(&mut nvs, provisioned_defaults).map_err(|e| {
        log::error!("config load failed ({}), refusing to start", e);
        Error::Config(e)
    })?;
    let poll_ms = config.poll_interval_ms;

    // ── 3. BLE transport ──────────────────────────────────────
    let mut ble = BleAdapter::new(&config.device_name).map_err(Error::from)?;
    ble.start().map_err(Error::from)?;

    // ── 4. Status indicator ───────────────────────────────────
    // SAFETY: the indicator GPIO is not claimed by any other driver.
    let pin = unsafe { AnyOutputPin::new(pins::STATUS_INDICATOR_GPIO) };
    let indicator = StatusIndicator::with_polarity(
        PinDriver::output(pin)?,
        pins::STATUS_INDICATOR_ACTIVE_LOW,
    );

    // ── 5. Pinpad service ─────────────────────────────────────
    let mut pinpad = PinpadService::new(config, nvs, ble, indicator);
    log_sink::attach(pinpad.callbacks());
    pinpad.setup().map_err(Error::from)?;
    pinpad.start();

    let clock = SystemClock::new();
    // No network time on this board; the RTC must be set externally.
    if pinpad.config().security_mode == SecurityMode::Totp && clock.unix_time_secs().is_none() {
        warn!("TOTP mode without a synced wall clock: every code is rejected until time is set");
    }
    info!("Pinpad ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    loop {
        while let Ok(event) = LINK_EVENTS.try_receive() {
            pinpad.on_link_event(event);
        }
        while let Ok(payload) = INBOUND.try_receive() {
            pinpad.ingest(&payload.bytes, &clock);
        }
        pinpad.poll(&clock);
        FreeRtos::delay_ms(poll_ms);
    }
}

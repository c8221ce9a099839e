//! Status indicator driver.
//!
//! Drives a single digital output (LED, relay, buzzer) through the
//! `embedded-hal` [`OutputPin`] trait, so the same driver runs against an
//! `esp-idf-hal` `PinDriver` on the device and a mock pin on the host.

use embedded_hal::digital::{Error as _, OutputPin};
use log::warn;

use crate::app::ports::IndicatorPort;

pub struct StatusIndicator<P: OutputPin> {
    pin: P,
    active_low: bool,
    on: bool,
}

impl<P: OutputPin> StatusIndicator<P> {
    pub fn new(pin: P) -> Self {
        Self::with_polarity(pin, false)
    }

    /// `active_low`: the output is driven low to switch the indicator on.
    pub fn with_polarity(pin: P, active_low: bool) -> Self {
        let mut indicator = Self {
            pin,
            active_low,
            on: true,
        };
        indicator.set_indicator(false);
        indicator
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> IndicatorPort for StatusIndicator<P> {
    fn set_indicator(&mut self, on: bool) {
        if on == self.on {
            return;
        }
        let high = on != self.active_low;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => self.on = on,
            Err(e) => warn!("Indicator: pin write failed ({:?})", e.kind()),
        }
    }
}

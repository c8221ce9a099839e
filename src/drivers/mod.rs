//! Hardware drivers.
//!
//! Each driver talks to an `embedded-hal` trait so it runs unchanged against
//! `esp-idf-hal` on the device and a mock on the host.

pub mod status_indicator;

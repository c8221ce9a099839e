//! BLE pinpad firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod otp;
pub mod pins;
pub mod rpc;

// Adapters and drivers carry both the ESP-IDF and the simulation backends;
// the backend is selected by cfg attributes inside each module.
pub mod adapters;
pub mod drivers;

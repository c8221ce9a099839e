//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the business rules of the pinpad: command
//! handling, the debounced accept/reject cycle, HOTP counter management
//! and the automation callbacks.  All interaction with storage, the BLE
//! stack and the indicator happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod counter;
pub mod events;
pub mod ports;
pub mod service;

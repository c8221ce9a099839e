//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements             | Connects to               |
//! |------------|------------------------|---------------------------|
//! | `ble`      | PublishPort            | Bluedroid GATT server     |
//! | `log_sink` | CallbackHub handlers   | Serial log output         |
//! | `nvs`      | ConfigPort             | NVS / in-memory store     |
//! |            | CounterPort            |                           |
//! |            | StoragePort            |                           |
//! | `time`     | ClockPort              | ESP32 system timer + RTC  |

pub mod ble;
pub mod log_sink;
pub mod nvs;
pub mod time;

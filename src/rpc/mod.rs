//! RPC characteristic plumbing.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      RPC Path                              │
//! │                                                            │
//! │  ┌───────────┐   ┌──────────┐   ┌──────────────────────┐   │
//! │  │ GATT write│──▶│ channels │──▶│ PinpadService::ingest│   │
//! │  │ (BLE task)│   │ (INBOUND)│   │  → codec::parse      │   │
//! │  └───────────┘   └──────────┘   └──────────────────────┘   │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod codec;

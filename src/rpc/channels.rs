//! BLE → control loop channels.
//!
//! Uses `embassy-sync` bounded MPMC channels to bridge the Bluedroid
//! callback task with the synchronous control loop.  Both sides share
//! these statics without heap allocation; the callback side only ever
//! uses `try_send`, so it never blocks the BLE stack.
//!
//! ```text
//! ┌──────────────┐  Payload    ┌──────────────┐
//! │  Bluedroid   │────────────▶│ Control Loop │
//! │  GATTS task  │  LinkEvent  │   (sync)     │
//! │              │────────────▶│              │
//! └──────────────┘             └──────────────┘
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

/// Capacity of a queued payload.  One byte over the parser limit so an
/// oversize write is still delivered and rejected by the service.
pub const PAYLOAD_CAPACITY: usize = super::codec::MAX_PAYLOAD_LEN + 1;

/// One write to the RPC characteristic.
#[derive(Debug, Clone)]
pub struct Payload {
    pub bytes: Vec<u8, PAYLOAD_CAPACITY>,
}

impl Payload {
    /// Copy `data` into a queueable payload.  Longer writes are cut at
    /// `PAYLOAD_CAPACITY`, which still exceeds the parser limit.
    pub fn from_slice(data: &[u8]) -> Self {
        let take = data.len().min(PAYLOAD_CAPACITY);
        let mut bytes = Vec::new();
        // `take` never exceeds the capacity.
        let _ = bytes.extend_from_slice(&data[..take]);
        Self { bytes }
    }
}

/// A long write arriving as ATT prepare-write fragments.
///
/// Fragments must arrive in offset order; a gap poisons the whole write.
/// Bytes past `PAYLOAD_CAPACITY` are dropped, which still leaves the
/// reassembled payload over the parser limit.
#[derive(Debug)]
pub struct PreparedWrite {
    bytes: Vec<u8, PAYLOAD_CAPACITY>,
    /// Total length seen, including bytes dropped past capacity.
    len: usize,
    poisoned: bool,
}

impl PreparedWrite {
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            len: 0,
            poisoned: false,
        }
    }

    pub fn append(&mut self, offset: usize, data: &[u8]) {
        if offset != self.len {
            self.poisoned = true;
        }
        if self.poisoned {
            return;
        }
        self.len += data.len();
        let room = PAYLOAD_CAPACITY - self.bytes.len();
        // Bounded by the remaining room.
        let _ = self.bytes.extend_from_slice(&data[..data.len().min(room)]);
    }

    /// End the write.  Returns the payload when `execute` is set and every
    /// fragment lined up; either way the buffer is reset.
    pub fn finish(&mut self, execute: bool) -> Option<Payload> {
        let done = core::mem::replace(self, Self::new());
        if !execute || done.poisoned || done.bytes.is_empty() {
            return None;
        }
        Some(Payload { bytes: done.bytes })
    }
}

impl Default for PreparedWrite {
    fn default() -> Self {
        Self::new()
    }
}

/// Peer connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
}

/// Channel depth for inbound payloads.
const INBOUND_DEPTH: usize = 8;

/// Inbound payload channel: GATTS write → control loop.
pub static INBOUND: Channel<CriticalSectionRawMutex, Payload, INBOUND_DEPTH> = Channel::new();

/// Connection events: GATTS connect/disconnect → control loop.
pub static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, 4> = Channel::new();

/// Queue a write from the BLE callback.  Returns `false` when the loop is
/// behind and the payload was dropped.
pub fn push_inbound(data: &[u8]) -> bool {
    if INBOUND.try_send(Payload::from_slice(data)).is_err() {
        log::warn!("rpc: inbound queue full, dropping {}-byte write", data.len());
        return false;
    }
    true
}

static PREPARED: Mutex<CriticalSectionRawMutex, RefCell<PreparedWrite>> =
    Mutex::new(RefCell::new(PreparedWrite::new()));

/// Buffer one prepare-write fragment from the BLE callback.
pub fn push_prepared(offset: usize, data: &[u8]) {
    PREPARED.lock(|w| w.borrow_mut().append(offset, data));
}

/// Execute (or cancel) the buffered long write.  A completed write is
/// queued like any other payload.
pub fn exec_prepared(execute: bool) -> bool {
    match PREPARED.lock(|w| w.borrow_mut().finish(execute)) {
        Some(payload) => {
            let len = payload.bytes.len();
            if INBOUND.try_send(payload).is_err() {
                log::warn!("rpc: inbound queue full, dropping {}-byte long write", len);
                return false;
            }
            true
        }
        None => {
            if execute {
                log::warn!("rpc: long write incomplete or out of order, dropped");
            }
            false
        }
    }
}

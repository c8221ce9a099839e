//! HOTP counter store.
//!
//! Wraps a [`CounterPort`] with the in-memory value.  Every advance is
//! persisted synchronously before the verdict it belongs to is acted on.
//! A failed write never rolls the counter back: the store keeps the new
//! value, marks itself dirty, and retries on the next advance or poll.
//! A reboot before a successful retry can replay the unsaved values once.
//!
//! A read error is not the same as an absent counter.  The store stays
//! unloaded, HOTP refuses every code, and the read is retried each poll.

use log::{info, warn};

use super::ports::CounterPort;
use crate::otp::MovingFactor;

pub struct CounterStore<S: CounterPort> {
    port: S,
    value: u32,
    loaded: bool,
    dirty: bool,
}

impl<S: CounterPort> CounterStore<S> {
    /// Load the persisted counter.  An absent value starts at 0; an
    /// unreadable one leaves the store unloaded.
    pub fn load(port: S) -> Self {
        let mut store = Self {
            port,
            value: 0,
            loaded: false,
            dirty: false,
        };
        store.try_load();
        store
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// The persisted value has been read (or confirmed absent).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Retry a failed initial read.  Returns `true` when this call
    /// recovered the value.
    pub fn retry_load(&mut self) -> bool {
        if self.loaded {
            return false;
        }
        self.try_load()
    }

    /// A previous write failed and has not been retried successfully yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Retry a failed write.  Cheap no-op when nothing is pending.
    pub fn flush(&mut self) {
        if self.dirty {
            self.persist();
        }
    }

    pub fn port(&self) -> &S {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut S {
        &mut self.port
    }

    fn try_load(&mut self) -> bool {
        match self.port.load_counter() {
            Ok(Some(v)) => {
                info!("counter: resumed at {}", v);
                self.value = v;
            }
            Ok(None) => {
                info!("counter: none stored, starting at 0");
                self.value = 0;
            }
            Err(e) => {
                warn!("counter: load failed ({}), HOTP disabled until read succeeds", e);
                return false;
            }
        }
        self.loaded = true;
        true
    }

    fn persist(&mut self) {
        match self.port.save_counter(self.value) {
            Ok(()) => {
                if self.dirty {
                    info!("counter: persisted {} after earlier failure", self.value);
                }
                self.dirty = false;
            }
            Err(e) => {
                warn!("counter: persisting {} failed ({}), will retry", self.value, e);
                self.dirty = true;
            }
        }
    }
}

impl<S: CounterPort> MovingFactor for CounterStore<S> {
    fn is_known(&self) -> bool {
        self.loaded
    }

    fn current(&self) -> u32 {
        self.value
    }

    fn advance(&mut self) -> u32 {
        if !self.loaded {
            return self.value;
        }
        self.value = self.value.saturating_add(1);
        self.persist();
        self.value
    }
}

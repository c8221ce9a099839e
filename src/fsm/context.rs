//! Shared mutable context threaded through every FSM handler.
//!
//! `PinpadContext` is the single struct that state handlers read from and
//! write to: the session (selected user, pending command), the indicator
//! command, and timing.  The service owns it and applies the indicator
//! command to the [`IndicatorPort`](crate::app::ports::IndicatorPort)
//! after every transition.

use heapless::String;

use crate::config::{MAX_CMD_ID_LEN, MAX_USER_ID_LEN};

// ---------------------------------------------------------------------------
// Session data
// ---------------------------------------------------------------------------

/// Per-interaction data.  Cleared on every return to `Idle` and on stop.
#[derive(Debug, Clone, Default)]
pub struct Session {
    user_id: String<MAX_USER_ID_LEN>,
    cmd_id: String<MAX_CMD_ID_LEN>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn cmd_id(&self) -> &str {
        &self.cmd_id
    }

    pub fn has_user(&self) -> bool {
        !self.user_id.is_empty()
    }

    /// Replace the selected user.  Ids longer than the buffer are refused
    /// and leave the previous value untouched.
    pub fn set_user(&mut self, user_id: &str) -> bool {
        copy_into(&mut self.user_id, user_id)
    }

    /// Replace the pending command id.  Same contract as [`set_user`](Self::set_user).
    pub fn set_cmd(&mut self, cmd_id: &str) -> bool {
        copy_into(&mut self.cmd_id, cmd_id)
    }

    pub fn clear(&mut self) {
        self.user_id.clear();
        self.cmd_id.clear();
    }
}

fn copy_into<const N: usize>(dst: &mut String<N>, src: &str) -> bool {
    if src.len() > N {
        return false;
    }
    dst.clear();
    dst.push_str(src).is_ok()
}

// ---------------------------------------------------------------------------
// PinpadContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
#[derive(Debug, Clone)]
pub struct PinpadContext {
    // -- Timing --
    /// Monotonic clock (ms), written by the service before each FSM call.
    pub now_ms: u64,
    /// Milliseconds since the current state was entered.
    pub ms_in_state: u64,
    /// How long `Accepted`/`Rejected` are held.
    pub hold_ms: u64,

    // -- Session --
    pub session: Session,

    // -- Outputs --
    /// Desired status indicator level.
    pub indicator_on: bool,
}

impl PinpadContext {
    pub fn new(hold_ms: u32) -> Self {
        Self {
            now_ms: 0,
            ms_in_state: 0,
            hold_ms: u64::from(hold_ms),
            session: Session::default(),
            indicator_on: false,
        }
    }

    /// Whether the debounce hold of a terminal state has run out.
    pub fn hold_elapsed(&self) -> bool {
        self.ms_in_state >= self.hold_ms
    }
}

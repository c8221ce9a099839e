//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch, no heap.
//!
//! ```text
//!  STOPPED ──[start]──▶ IDLE ──[pin ok]──▶ ACCEPTED ──[hold]──┐
//!     ▲                  │ ▲                                  │
//!     │                  │ └───────────────[hold]─────────────┤
//!     │                  └──[pin bad]──▶ REJECTED ──[hold]────┘
//!     │
//!  Any state ──[stop]──▶ STOPPED
//! ```
//!
//! Only the hold expiry is driven from `on_update`; start, stop and the
//! verdict are events applied by the service via `force_transition`.

use super::context::PinpadContext;
use super::{StateDescriptor, StateId};
use log::{debug, info};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Stopped
        StateDescriptor {
            id: StateId::Stopped,
            name: "Stopped",
            on_enter: Some(stopped_enter),
            on_exit: None,
            on_update: stay,
        },
        // Index 1 — Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: stay,
        },
        // Index 2 — Accepted
        StateDescriptor {
            id: StateId::Accepted,
            name: "Accepted",
            on_enter: Some(accepted_enter),
            on_exit: Some(accepted_exit),
            on_update: hold_update,
        },
        // Index 3 — Rejected
        StateDescriptor {
            id: StateId::Rejected,
            name: "Rejected",
            on_enter: Some(rejected_enter),
            on_exit: None,
            on_update: hold_update,
        },
    ]
}

fn stay(_ctx: &mut PinpadContext) -> Option<StateId> {
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  STOPPED
// ═══════════════════════════════════════════════════════════════════════════

fn stopped_enter(ctx: &mut PinpadContext) {
    ctx.session.clear();
    ctx.indicator_on = false;
    info!("STOPPED: input disabled");
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut PinpadContext) {
    ctx.session.clear();
    ctx.indicator_on = false;
    info!("IDLE: waiting for user selection");
}

// ═══════════════════════════════════════════════════════════════════════════
//  ACCEPTED / REJECTED — debounce hold
// ═══════════════════════════════════════════════════════════════════════════

fn accepted_enter(ctx: &mut PinpadContext) {
    ctx.indicator_on = true;
    info!(
        "ACCEPTED: user '{}' cmd '{}', holding {} ms",
        ctx.session.user_id(),
        ctx.session.cmd_id(),
        ctx.hold_ms
    );
}

fn accepted_exit(ctx: &mut PinpadContext) {
    ctx.indicator_on = false;
}

fn rejected_enter(ctx: &mut PinpadContext) {
    ctx.indicator_on = false;
    info!(
        "REJECTED: user '{}', holding {} ms",
        ctx.session.user_id(),
        ctx.hold_ms
    );
}

fn hold_update(ctx: &mut PinpadContext) -> Option<StateId> {
    if ctx.hold_elapsed() {
        debug!("hold expired after {} ms", ctx.ms_in_state);
        return Some(StateId::Idle);
    }
    None
}

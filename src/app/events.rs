//! Callback hub for downstream automation.
//!
//! Three independent channels, each an ordered list of boxed handlers
//! fired synchronously in registration order:
//!
//! - **state-changed** — every transition, with a [`StateSnapshot`]
//! - **user-selected** — the selected user id
//! - **user-command** — the invoked command id
//!
//! Handlers get explicit snapshots; they never see the service itself.

use crate::fsm::StateId;
use crate::fsm::context::Session;

/// State and session values at the moment a transition fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    state: StateId,
    user_id: String,
    cmd_id: String,
}

impl StateSnapshot {
    pub fn new(state: StateId, user_id: &str, cmd_id: &str) -> Self {
        Self {
            state,
            user_id: user_id.into(),
            cmd_id: cmd_id.into(),
        }
    }

    pub(crate) fn capture(state: StateId, session: &Session) -> Self {
        Self::new(state, session.user_id(), session.cmd_id())
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn cmd_id(&self) -> &str {
        &self.cmd_id
    }

    pub fn is_accepted(&self) -> bool {
        self.state == StateId::Accepted
    }

    pub fn is_rejected(&self) -> bool {
        self.state == StateId::Rejected
    }
}

pub type StateHandler = Box<dyn FnMut(&StateSnapshot)>;
pub type IdHandler = Box<dyn FnMut(&str)>;

/// Multi-subscriber notification surface.
#[derive(Default)]
pub struct CallbackHub {
    state_changed: Vec<StateHandler>,
    user_selected: Vec<IdHandler>,
    user_command: Vec<IdHandler>,
}

impl CallbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_state_changed(&mut self, f: impl FnMut(&StateSnapshot) + 'static) {
        self.state_changed.push(Box::new(f));
    }

    pub fn on_user_selected(&mut self, f: impl FnMut(&str) + 'static) {
        self.user_selected.push(Box::new(f));
    }

    pub fn on_user_command(&mut self, f: impl FnMut(&str) + 'static) {
        self.user_command.push(Box::new(f));
    }

    /// `(user_id, cmd_id)` on every entry into `Accepted`.
    pub fn on_accepted(&mut self, mut f: impl FnMut(&str, &str) + 'static) {
        self.on_state_changed(move |s| {
            if s.is_accepted() {
                f(s.user_id(), s.cmd_id());
            }
        });
    }

    /// `(user_id, cmd_id)` on every entry into `Rejected`.
    pub fn on_rejected(&mut self, mut f: impl FnMut(&str, &str) + 'static) {
        self.on_state_changed(move |s| {
            if s.is_rejected() {
                f(s.user_id(), s.cmd_id());
            }
        });
    }

    pub(crate) fn fire_state_changed(&mut self, snapshot: &StateSnapshot) {
        for h in &mut self.state_changed {
            h(snapshot);
        }
    }

    pub(crate) fn fire_user_selected(&mut self, user_id: &str) {
        for h in &mut self.user_selected {
            h(user_id);
        }
    }

    pub(crate) fn fire_user_command(&mut self, cmd_id: &str) {
        for h in &mut self.user_command {
            h(cmd_id);
        }
    }

    /// Total number of registered handlers across all channels.
    pub fn len(&self) -> usize {
        self.state_changed.len() + self.user_selected.len() + self.user_command.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

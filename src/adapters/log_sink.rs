//! Log-based callback sink.
//!
//! Subscribes to the [`CallbackHub`] and writes every pinpad event to the
//! ESP-IDF logger (UART / USB-CDC in production).  User ids are logged,
//! submitted PINs never are.

use log::info;

use crate::app::events::{CallbackHub, StateSnapshot};

/// Register log handlers on all three callback channels.
pub fn attach(hub: &mut CallbackHub) {
    hub.on_state_changed(log_state);
    hub.on_user_selected(|user_id| info!("USER  | selected '{}'", user_id));
    hub.on_user_command(|cmd_id| info!("CMD   | invoked '{}'", cmd_id));
}

fn log_state(s: &StateSnapshot) {
    if s.user_id().is_empty() {
        info!("STATE | {:?}", s.state());
    } else {
        info!(
            "STATE | {:?} | user='{}' cmd='{}'",
            s.state(),
            s.user_id(),
            s.cmd_id()
        );
    }
}

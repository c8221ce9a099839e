//! Inbound commands to the pinpad service.
//!
//! These are produced by [`crate::rpc::codec::parse`] from raw payloads
//! written to the RPC characteristic and interpreted by the
//! [`PinpadService`](super::service::PinpadService).

use heapless::String;

use crate::config::{MAX_CMD_ID_LEN, MAX_USER_ID_LEN};

/// Longest accepted pin / one-time code, in bytes.
pub const MAX_PIN_LEN: usize = 16;

/// Commands a connected peer can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinpadCommand {
    /// Choose the user the next pin is checked for.
    SelectUser(String<MAX_USER_ID_LEN>),

    /// Submit a code for the selected user, optionally tagged with the
    /// command the peer wants run on success.
    SubmitPin {
        pin: String<MAX_PIN_LEN>,
        cmd_id: String<MAX_CMD_ID_LEN>,
    },

    /// Ask for the user-commands table to be published.
    RequestUserCommands,

    /// Run a command from the user-commands table (valid while `Accepted`).
    InvokeUserCommand(String<MAX_CMD_ID_LEN>),
}

impl PinpadCommand {
    /// Short name for logs.  Never includes the pin.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectUser(_) => "SelectUser",
            Self::SubmitPin { .. } => "SubmitPin",
            Self::RequestUserCommands => "RequestUserCommands",
            Self::InvokeUserCommand(_) => "InvokeUserCommand",
        }
    }
}

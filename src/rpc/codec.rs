//! Command payload codec.
//!
//! Wire format (one GATT write = one payload):
//! ```text
//! ┌─────────┬──────────────────────────────────────────────────────┐
//! │ Tag (1B)│ Body                                                 │
//! ├─────────┼──────────────────────────────────────────────────────┤
//! │  0x01   │ user id, UTF-8, 1–64 printable ASCII bytes           │
//! │  0x02   │ pin_len (1B) │ pin (1–16B) │ cmd id (0–32B, optional)│
//! │  0x03   │ (empty)                                              │
//! │  0x04   │ cmd id, UTF-8, 1–32 bytes                            │
//! └─────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! Payloads are at most [`MAX_PAYLOAD_LEN`] bytes.  Parsing is pure; the
//! caller owns the buffer and decides what to do with a [`ParseError`].

use core::fmt;

use heapless::String;

use crate::app::commands::{MAX_PIN_LEN, PinpadCommand};
use crate::config::MAX_USER_ID_LEN;

/// Largest payload accepted on the RPC characteristic.
pub const MAX_PAYLOAD_LEN: usize = 255;

pub const TAG_SELECT_USER: u8 = 0x01;
pub const TAG_SUBMIT_PIN: u8 = 0x02;
pub const TAG_REQUEST_USER_COMMANDS: u8 = 0x03;
pub const TAG_INVOKE_USER_COMMAND: u8 = 0x04;

/// Why a payload was not turned into a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    TooLong(usize),
    UnknownTag(u8),
    /// Body shorter than its declared layout.
    Truncated,
    /// Bytes left over where the layout allows none.
    TrailingData,
    /// A field is empty or longer than its limit.
    BadLength,
    InvalidUtf8,
    /// User id contains control or non-ASCII characters.
    InvalidCharacters,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty payload"),
            Self::TooLong(n) => write!(f, "payload too long ({n} > {MAX_PAYLOAD_LEN})"),
            Self::UnknownTag(t) => write!(f, "unknown command tag 0x{t:02x}"),
            Self::Truncated => write!(f, "truncated body"),
            Self::TrailingData => write!(f, "trailing data"),
            Self::BadLength => write!(f, "field length out of range"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Self::InvalidCharacters => write!(f, "invalid characters"),
        }
    }
}

/// Decode one complete payload.
pub fn parse(payload: &[u8]) -> Result<PinpadCommand, ParseError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ParseError::TooLong(payload.len()));
    }
    let (&tag, body) = payload.split_first().ok_or(ParseError::Empty)?;

    match tag {
        TAG_SELECT_USER => {
            let user: String<MAX_USER_ID_LEN> = text_field(body, 1)?;
            if !user.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
                return Err(ParseError::InvalidCharacters);
            }
            Ok(PinpadCommand::SelectUser(user))
        }
        TAG_SUBMIT_PIN => {
            let (&pin_len, rest) = body.split_first().ok_or(ParseError::Truncated)?;
            let pin_len = usize::from(pin_len);
            if pin_len == 0 || pin_len > MAX_PIN_LEN {
                return Err(ParseError::BadLength);
            }
            if rest.len() < pin_len {
                return Err(ParseError::Truncated);
            }
            let (pin, cmd) = rest.split_at(pin_len);
            Ok(PinpadCommand::SubmitPin {
                pin: text_field(pin, 1)?,
                cmd_id: text_field(cmd, 0)?,
            })
        }
        TAG_REQUEST_USER_COMMANDS => {
            if !body.is_empty() {
                return Err(ParseError::TrailingData);
            }
            Ok(PinpadCommand::RequestUserCommands)
        }
        TAG_INVOKE_USER_COMMAND => Ok(PinpadCommand::InvokeUserCommand(text_field(body, 1)?)),
        other => Err(ParseError::UnknownTag(other)),
    }
}

/// Copy a UTF-8 field of `min..=N` bytes into a fixed-capacity string.
fn text_field<const N: usize>(bytes: &[u8], min: usize) -> Result<String<N>, ParseError> {
    if bytes.len() < min || bytes.len() > N {
        return Err(ParseError::BadLength);
    }
    let s = core::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)?;
    let mut out = String::new();
    out.push_str(s).map_err(|()| ParseError::BadLength)?;
    Ok(out)
}

/// Build a payload for `cmd`.  Used by tests and host tooling.
pub fn encode(cmd: &PinpadCommand) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_PAYLOAD_LEN);
    match cmd {
        PinpadCommand::SelectUser(user) => {
            out.push(TAG_SELECT_USER);
            out.extend_from_slice(user.as_bytes());
        }
        PinpadCommand::SubmitPin { pin, cmd_id } => {
            out.push(TAG_SUBMIT_PIN);
            out.push(pin.len() as u8);
            out.extend_from_slice(pin.as_bytes());
            out.extend_from_slice(cmd_id.as_bytes());
        }
        PinpadCommand::RequestUserCommands => out.push(TAG_REQUEST_USER_COMMANDS),
        PinpadCommand::InvokeUserCommand(id) => {
            out.push(TAG_INVOKE_USER_COMMAND);
            out.extend_from_slice(id.as_bytes());
        }
    }
    out
}

//! Text codec for Miniserver datagrams.
//!
//! Two shapes share the same four leading segments:
//!
//! | Shape  | Grammar                             |
//! |--------|-------------------------------------|
//! | Status | `system/room/device/feature=value`  |
//! | Action | `system/room/device/feature/action` |
//!
//! Decoding tries the status shape first. The status value is everything after
//! the first `=` that leaves four non-empty leading segments, so it may itself
//! contain `=` and `/`. The action is the remainder after the fourth `/`.
//!
//! Segments never contain `/`. An `=` preceded by more than four segments is
//! therefore not a status: `a/b/c/d/x=y` decodes as an action with
//! `action = "x=y"` rather than a status whose system is `a/b`. This keeps
//! every encoded action decoding back to itself.

use std::str::FromStr;

use thiserror::Error;

use crate::message::{ActionMessage, MiniserverMessage, StatusMessage};

const SEPARATOR: char = '/';
const ASSIGN: char = '=';

/// Reason a datagram could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("unrecognized message format")]
    Unrecognized,
}

/// Encode a message into its wire text. No escaping is applied.
pub fn encode(message: &MiniserverMessage) -> String {
    message.to_string()
}

/// Classify and parse a datagram's text.
pub fn decode(text: &str) -> Result<MiniserverMessage, DecodeError> {
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }
    if let Some(status) = decode_status(text) {
        return Ok(MiniserverMessage::Status(status));
    }
    if let Some(action) = decode_action(text) {
        return Ok(MiniserverMessage::Action(action));
    }
    Err(DecodeError::Unrecognized)
}

/// Parse the status shape only.
pub fn decode_status(text: &str) -> Option<StatusMessage> {
    for (idx, _) in text.match_indices(ASSIGN) {
        let value = &text[idx + 1..];
        if value.is_empty() {
            // Trailing '='.
            return None;
        }
        if let Some([system, room, device, feature]) = leading_segments(&text[..idx]) {
            return Some(StatusMessage::new(system, room, device, feature, value));
        }
    }
    None
}

/// Parse the action shape only.
pub fn decode_action(text: &str) -> Option<ActionMessage> {
    let mut parts = text.splitn(5, SEPARATOR);
    let system = non_empty(parts.next())?;
    let room = non_empty(parts.next())?;
    let device = non_empty(parts.next())?;
    let feature = non_empty(parts.next())?;
    let action = non_empty(parts.next())?;
    Some(ActionMessage::new(system, room, device, feature, action))
}

/// Exactly four non-empty `/`-separated segments.
fn leading_segments(head: &str) -> Option<[&str; 4]> {
    let mut parts = head.split(SEPARATOR);
    let segments = [
        non_empty(parts.next())?,
        non_empty(parts.next())?,
        non_empty(parts.next())?,
        non_empty(parts.next())?,
    ];
    if parts.next().is_some() {
        return None;
    }
    Some(segments)
}

fn non_empty(part: Option<&str>) -> Option<&str> {
    part.filter(|s| !s.is_empty())
}

impl FromStr for MiniserverMessage {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

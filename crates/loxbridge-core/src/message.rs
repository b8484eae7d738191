//! Structured messages exchanged with the Miniserver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of a device feature.
///
/// Wire form: `system/room/device/feature=value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusMessage {
    pub system: String,
    pub room: String,
    pub device: String,
    pub feature: String,
    pub value: String,
}

impl StatusMessage {
    pub fn new(
        system: impl Into<String>,
        room: impl Into<String>,
        device: impl Into<String>,
        feature: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            room: room.into(),
            device: device.into(),
            feature: feature.into(),
            value: value.into(),
        }
    }

    /// `system/room/device/feature`, used as a series and topic key.
    pub fn path(&self) -> String {
        format!("{}/{}/{}/{}", self.system, self.room, self.device, self.feature)
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.path(), self.value)
    }
}

/// Command directed at a device feature.
///
/// Wire form: `system/room/device/feature/action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionMessage {
    pub system: String,
    pub room: String,
    pub device: String,
    pub feature: String,
    pub action: String,
}

impl ActionMessage {
    pub fn new(
        system: impl Into<String>,
        room: impl Into<String>,
        device: impl Into<String>,
        feature: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            room: room.into(),
            device: device.into(),
            feature: feature.into(),
            action: action.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}/{}/{}", self.system, self.room, self.device, self.feature)
    }
}

impl fmt::Display for ActionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path(), self.action)
    }
}

/// A decoded Miniserver datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MiniserverMessage {
    Status(StatusMessage),
    Action(ActionMessage),
}

impl MiniserverMessage {
    pub fn as_status(&self) -> Option<&StatusMessage> {
        match self {
            Self::Status(m) => Some(m),
            Self::Action(_) => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionMessage> {
        match self {
            Self::Action(m) => Some(m),
            Self::Status(_) => None,
        }
    }
}

impl fmt::Display for MiniserverMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(m) => m.fmt(f),
            Self::Action(m) => m.fmt(f),
        }
    }
}

impl From<StatusMessage> for MiniserverMessage {
    fn from(m: StatusMessage) -> Self {
        Self::Status(m)
    }
}

impl From<ActionMessage> for MiniserverMessage {
    fn from(m: ActionMessage) -> Self {
        Self::Action(m)
    }
}

//! Control actions understood by the provider's command endpoints

use std::fmt;

/// An imperative command applied to a named player
///
/// Each action maps onto the URL path the provider expects after the
/// room name, e.g. `/<room>/volume/30` or `/<room>/join/<target>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    Volume(u8),
    Mute(bool),
    /// Join the group coordinated by the named room
    Join(String),
    /// Leave the current group and become standalone
    Leave,
}

impl Action {
    /// Short action name used in logs and API responses
    pub fn name(&self) -> &'static str {
        match self {
            Action::Play => "play",
            Action::Pause => "pause",
            Action::Stop => "stop",
            Action::Next => "next",
            Action::Previous => "previous",
            Action::Volume(_) => "volume",
            Action::Mute(true) => "mute",
            Action::Mute(false) => "unmute",
            Action::Join(_) => "join",
            Action::Leave => "leave",
        }
    }

    /// Path segments appended after the target room
    pub fn path_segments(&self) -> Vec<String> {
        match self {
            Action::Volume(level) => vec!["volume".to_string(), level.to_string()],
            Action::Join(target) => vec!["join".to_string(), target.clone()],
            other => vec![other.name().to_string()],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segments().join("/"))
    }
}

/// Raw result of a command as answered by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: u16,
    pub body: String,
}

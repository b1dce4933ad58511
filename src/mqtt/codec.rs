//! Plain-text payload codec for status and command messages

use super::topics::Action;
use thiserror::Error;

pub const TRUE: &str = "true";
pub const FALSE: &str = "false";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command action '{0}'")]
    UnknownAction(String),

    #[error("Incorrect value '{payload}' for {action}")]
    InvalidPayload { action: Action, payload: String },

    #[error("Ignoring {action} command with payload '{payload}'")]
    SentinelMismatch { action: Action, payload: String },
}

/// A validated command, ready to be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetVolume(u8),
    SetMute(bool),
    Sleep,
    DisplaySleep,
    Shutdown,
}

impl Command {
    /// Validates `payload` for the command topic segment `action`.
    pub fn decode(action: &str, payload: &[u8]) -> Result<Self, CommandError> {
        let action =
            Action::from_name(action).ok_or_else(|| CommandError::UnknownAction(action.into()))?;
        let text = String::from_utf8_lossy(payload);

        let invalid = || CommandError::InvalidPayload {
            action,
            payload: text.to_string(),
        };

        match action {
            Action::Volume => decode_volume(&text).map(Command::SetVolume).ok_or_else(invalid),
            Action::Mute => decode_bool(&text).map(Command::SetMute).ok_or_else(invalid),
            Action::Sleep | Action::DisplaySleep | Action::Shutdown => {
                // Power actions only fire on the exact action name
                if text != action.as_str() {
                    return Err(CommandError::SentinelMismatch {
                        action,
                        payload: text.to_string(),
                    });
                }
                Ok(match action {
                    Action::Sleep => Command::Sleep,
                    Action::DisplaySleep => Command::DisplaySleep,
                    _ => Command::Shutdown,
                })
            }
        }
    }
}

/// Integer in `[0, 100]`, nothing else
pub fn decode_volume(text: &str) -> Option<u8> {
    let value: i64 = text.parse().ok()?;
    if (0..=100).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

/// Accepts the usual boolean spellings: 1, t, T, TRUE, true, True and their
/// false counterparts.
pub fn decode_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

pub fn encode_bool(value: bool) -> &'static str {
    if value {
        TRUE
    } else {
        FALSE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_accepts_full_range_only() {
        for v in 0..=100u8 {
            assert_eq!(
                Command::decode("volume", v.to_string().as_bytes()),
                Ok(Command::SetVolume(v))
            );
        }
        for bad in ["101", "-1", "abc", "", "50.5", " 50"] {
            assert!(matches!(
                Command::decode("volume", bad.as_bytes()),
                Err(CommandError::InvalidPayload { .. })
            ));
        }
    }

    #[test]
    fn mute_accepts_boolean_spellings() {
        assert_eq!(Command::decode("mute", b"true"), Ok(Command::SetMute(true)));
        assert_eq!(Command::decode("mute", b"T"), Ok(Command::SetMute(true)));
        assert_eq!(Command::decode("mute", b"0"), Ok(Command::SetMute(false)));
        assert_eq!(Command::decode("mute", b"False"), Ok(Command::SetMute(false)));
        assert!(Command::decode("mute", b"yes").is_err());
        assert!(Command::decode("mute", b"tRuE").is_err());
    }

    #[test]
    fn power_actions_need_exact_sentinel() {
        assert_eq!(Command::decode("sleep", b"sleep"), Ok(Command::Sleep));
        assert_eq!(
            Command::decode("displaysleep", b"displaysleep"),
            Ok(Command::DisplaySleep)
        );
        assert_eq!(Command::decode("shutdown", b"shutdown"), Ok(Command::Shutdown));

        for bad in ["Shutdown", "shutdown ", "true", "sleep", ""] {
            assert!(matches!(
                Command::decode("shutdown", bad.as_bytes()),
                Err(CommandError::SentinelMismatch { .. })
            ));
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert_eq!(
            Command::decode("reboot", b"reboot"),
            Err(CommandError::UnknownAction("reboot".into()))
        );
    }
}

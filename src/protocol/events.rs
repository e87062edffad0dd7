use serde::Serialize;

use crate::player::{equalizer::Equalizer, state::SessionSnapshot, track::TrackView};

/// Messages sent from the server to viewers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    AuthSuccess {
        /// `None` when the viewer is connected but no session matched.
        state: Option<SessionSnapshot>,
    },
    AuthFailed {
        reason: String,
    },
    NowPlaying {
        #[serde(flatten)]
        state: SessionSnapshot,
    },
    PlaylistUpdated {
        queue: Vec<TrackView>,
    },
    EqChanged {
        #[serde(flatten)]
        equalizer: Equalizer,
    },
    CommandAck {
        command: String,
        status: AckStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl OutgoingMessage {
    pub fn ack(command: impl Into<String>, status: AckStatus, message: Option<String>) -> Self {
        Self::CommandAck {
            command: command.into(),
            status,
            message,
        }
    }

    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Ok,
    Error,
    Unauthorized,
    Unauthenticated,
    UnknownCommand,
    NoSession,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ack_shape() {
        let json = serde_json::to_value(OutgoingMessage::ack("set_volume", AckStatus::Ok, None)).unwrap();
        assert_eq!(json, json!({"type": "command_ack", "command": "set_volume", "status": "ok"}));
    }

    #[test]
    fn test_auth_failed_shape() {
        let json = serde_json::to_value(OutgoingMessage::AuthFailed { reason: "token expired".into() }).unwrap();
        assert_eq!(json, json!({"type": "auth_failed", "reason": "token expired"}));
    }

    #[test]
    fn test_eq_changed_is_flat() {
        let json = serde_json::to_value(OutgoingMessage::EqChanged {
            equalizer: Equalizer::default(),
        })
        .unwrap();
        assert_eq!(json["type"], "eq_changed");
        assert_eq!(json["preset"], "flat");
        assert_eq!(json["bands"].as_array().map(Vec::len), Some(10));
    }

    #[test]
    fn test_auth_success_without_session() {
        let json = serde_json::to_value(OutgoingMessage::AuthSuccess { state: None }).unwrap();
        assert_eq!(json, json!({"type": "auth_success", "state": null}));
    }
}

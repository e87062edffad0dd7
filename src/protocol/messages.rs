use serde::Deserialize;
use serde_json::Value;

use crate::common::types::{ChannelId, GuildId, UserId};

/// Messages a viewer sends over the socket.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Auth {
        token: String,
    },
    /// Handshake from an overlay embedded in the chat platform, which
    /// identifies the channel instead of presenting a token.
    NativeAuth {
        guild_id: GuildId,
        channel_id: ChannelId,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    Command {
        command: String,
        #[serde(default)]
        data: Value,
    },
}

impl IncomingMessage {
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::NativeAuth { .. })
    }
}

/// A parsed playback command, shared by the gateway and local callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play { query: Option<String> },
    Pause,
    Resume,
    Skip,
    Stop,
    SetVolume { volume: f64 },
    QueueAdd { query: String },
    QueueRemove { index: usize },
    QueueJump { index: usize },
    EqPreset { preset: String },
    EqUpdate { band: usize, gain: f32 },
    ShuffleToggle,
    RepeatToggle,
    PromoteDj { user_id: UserId },
    ForceStop,
    RevokeTokens,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandParseError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("invalid data for `{command}`: {reason}")]
    InvalidData { command: String, reason: String },
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(alias = "url")]
    query: Option<String>,
}

#[derive(Deserialize)]
struct VolumeData {
    volume: f64,
}

#[derive(Deserialize)]
struct IndexData {
    index: usize,
}

#[derive(Deserialize)]
struct PresetData {
    preset: String,
}

#[derive(Deserialize)]
struct BandData {
    band: usize,
    gain: f32,
}

#[derive(Deserialize)]
struct UserData {
    user_id: UserId,
}

impl Command {
    pub fn parse(name: &str, data: Value) -> Result<Self, CommandParseError> {
        // Unit commands ignore their payload; `data` may be absent, null or {}.
        let data = if data.is_null() { Value::Object(Default::default()) } else { data };

        fn decode<T: serde::de::DeserializeOwned>(name: &str, data: Value) -> Result<T, CommandParseError> {
            serde_json::from_value(data).map_err(|e| CommandParseError::InvalidData {
                command: name.to_string(),
                reason: e.to_string(),
            })
        }

        Ok(match name {
            "play" => Self::Play {
                query: decode::<QueryData>(name, data)?
                    .query
                    .filter(|q| !q.trim().is_empty()),
            },
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "skip" => Self::Skip,
            "stop" => Self::Stop,
            "set_volume" => Self::SetVolume {
                volume: decode::<VolumeData>(name, data)?.volume,
            },
            "queue_add" => {
                let query = decode::<QueryData>(name, data)?
                    .query
                    .filter(|q| !q.trim().is_empty())
                    .ok_or_else(|| CommandParseError::InvalidData {
                        command: name.to_string(),
                        reason: "missing field `query`".to_string(),
                    })?;
                Self::QueueAdd { query }
            }
            "queue_remove" => Self::QueueRemove {
                index: decode::<IndexData>(name, data)?.index,
            },
            "queue_jump" => Self::QueueJump {
                index: decode::<IndexData>(name, data)?.index,
            },
            "eq_preset" => Self::EqPreset {
                preset: decode::<PresetData>(name, data)?.preset,
            },
            "eq_update" => {
                let d: BandData = decode(name, data)?;
                Self::EqUpdate { band: d.band, gain: d.gain }
            }
            "shuffle_toggle" => Self::ShuffleToggle,
            "repeat_toggle" => Self::RepeatToggle,
            "promote_dj" => Self::PromoteDj {
                user_id: decode::<UserData>(name, data)?.user_id,
            },
            "force_stop" => Self::ForceStop,
            "revoke_tokens" => Self::RevokeTokens,
            other => return Err(CommandParseError::Unknown(other.to_string())),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Skip => "skip",
            Self::Stop => "stop",
            Self::SetVolume { .. } => "set_volume",
            Self::QueueAdd { .. } => "queue_add",
            Self::QueueRemove { .. } => "queue_remove",
            Self::QueueJump { .. } => "queue_jump",
            Self::EqPreset { .. } => "eq_preset",
            Self::EqUpdate { .. } => "eq_update",
            Self::ShuffleToggle => "shuffle_toggle",
            Self::RepeatToggle => "repeat_toggle",
            Self::PromoteDj { .. } => "promote_dj",
            Self::ForceStop => "force_stop",
            Self::RevokeTokens => "revoke_tokens",
        }
    }

    /// Only the configured owner may run these.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::ForceStop | Self::RevokeTokens)
    }

    /// Anyone bound to the session may add music; everything else, including
    /// a bare `play` that resumes, needs DJ rights.
    pub fn requires_dj(&self) -> bool {
        !matches!(self, Self::Play { query: Some(_) } | Self::QueueAdd { .. }) && !self.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_variants_deserialize() {
        let auth: IncomingMessage = serde_json::from_value(json!({"type": "auth", "token": "abc"})).unwrap();
        assert_eq!(auth, IncomingMessage::Auth { token: "abc".into() });

        let native: IncomingMessage = serde_json::from_value(json!({
            "type": "native_auth", "guild_id": "10", "channel_id": 20
        }))
        .unwrap();
        assert_eq!(
            native,
            IncomingMessage::NativeAuth {
                guild_id: GuildId(10),
                channel_id: ChannelId(20),
                user_id: None
            }
        );
        assert!(native.is_handshake());
    }

    #[test]
    fn test_command_envelope_defaults_data() {
        let msg: IncomingMessage = serde_json::from_value(json!({"type": "command", "command": "skip"})).unwrap();
        let IncomingMessage::Command { command, data } = msg else {
            panic!("expected command");
        };
        assert_eq!(Command::parse(&command, data), Ok(Command::Skip));
    }

    #[test]
    fn test_unit_commands_ignore_payload() {
        assert_eq!(Command::parse("pause", json!({})), Ok(Command::Pause));
        assert_eq!(Command::parse("pause", json!({"extra": 1})), Ok(Command::Pause));
    }

    #[test]
    fn test_parse_commands_with_data() {
        assert_eq!(
            Command::parse("set_volume", json!({"volume": 150})),
            Ok(Command::SetVolume { volume: 150.0 })
        );
        assert_eq!(
            Command::parse("queue_add", json!({"url": "https://a.b/c"})),
            Ok(Command::QueueAdd { query: "https://a.b/c".into() })
        );
        assert_eq!(
            Command::parse("eq_update", json!({"band": 2, "gain": -3.5})),
            Ok(Command::EqUpdate { band: 2, gain: -3.5 })
        );
        assert_eq!(Command::parse("play", json!(null)), Ok(Command::Play { query: None }));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Command::parse("self_destruct", json!({})),
            Err(CommandParseError::Unknown("self_destruct".into()))
        );
        assert!(matches!(
            Command::parse("queue_remove", json!({"index": -1})),
            Err(CommandParseError::InvalidData { .. })
        ));
        assert!(matches!(
            Command::parse("queue_add", json!({"query": "   "})),
            Err(CommandParseError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_scopes() {
        assert!(Command::ForceStop.is_admin());
        assert!(!Command::ForceStop.requires_dj());
        assert!(!Command::QueueAdd { query: "x".into() }.requires_dj());
        assert!(Command::Skip.requires_dj());
        assert!(Command::Play { query: None }.requires_dj());
        assert!(!Command::Play { query: Some("x".into()) }.requires_dj());
        assert!(Command::SetVolume { volume: 1.0 }.requires_dj());
    }
}

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Platform snowflake identifiers.
///
/// They serialize as strings because the overlay runs in a browser where
/// 64-bit integers lose precision, and deserialize from either a string or
/// a number.
macro_rules! snowflake_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name(pub u64);

            impl From<u64> for $name {
                fn from(v: u64) -> Self {
                    Self(v)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl std::str::FromStr for $name {
                type Err = std::num::ParseIntError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    s.trim().parse::<u64>().map(Self)
                }
            }

            impl Serialize for $name {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.collect_str(&self.0)
                }
            }

            impl<'de> Deserialize<'de> for $name {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    match serde_json::Value::deserialize(deserializer)? {
                        serde_json::Value::String(s) => s
                            .parse::<u64>()
                            .map(Self)
                            .map_err(serde::de::Error::custom),
                        serde_json::Value::Number(n) => n
                            .as_u64()
                            .map(Self)
                            .ok_or_else(|| serde::de::Error::custom("expected unsigned id")),
                        _ => Err(serde::de::Error::custom("expected string or number id")),
                    }
                }
            }
        )*
    };
}

snowflake_id!(GuildId, ChannelId, UserId);

/// Audio container/codec of an extracted stream, as far as it can be told
/// from the extractor's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Aac,
    Opus,
    Webm,
    Mp4,
    Mp3,
    Ogg,
    Flac,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn from_ext(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "aac" => Self::Aac,
            "opus" => Self::Opus,
            "webm" => Self::Webm,
            "mp4" | "m4a" => Self::Mp4,
            "mp3" => Self::Mp3,
            "ogg" => Self::Ogg,
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            _ => Self::Unknown,
        }
    }

    /// Detects the format from a media URL using `itag`/`mime` hints, then
    /// the path extension.
    pub fn from_url(url: &str) -> Self {
        if url.contains(".m3u8") || url.contains("/playlist") {
            return Self::Aac;
        }

        let itag: Option<u32> = url.split('?').nth(1).and_then(|qs| {
            qs.split('&').find_map(|kv| {
                let mut parts = kv.splitn(2, '=');
                if parts.next() == Some("itag") {
                    parts.next().and_then(|v| v.parse().ok())
                } else {
                    None
                }
            })
        });

        match itag {
            Some(249) | Some(250) | Some(251) => return Self::Webm,
            Some(139) | Some(140) | Some(141) => return Self::Mp4,
            _ => {}
        }

        if url.contains("mime=audio%2Fwebm") || url.contains("mime=audio/webm") {
            return Self::Webm;
        }
        if url.contains("mime=audio%2Fmp4") || url.contains("mime=audio/mp4") {
            return Self::Mp4;
        }

        std::path::Path::new(url.split('?').next().unwrap_or(url))
            .extension()
            .and_then(|s| s.to_str())
            .map(Self::from_ext)
            .unwrap_or(Self::Unknown)
    }

    /// Opus payloads can be forwarded to the voice layer without re-encoding.
    pub fn is_opus_passthrough(&self) -> bool {
        matches!(self, Self::Webm | Self::Ogg | Self::Opus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_strings() {
        let json = serde_json::to_string(&GuildId(1234567890123456789)).unwrap();
        assert_eq!(json, "\"1234567890123456789\"");
    }

    #[test]
    fn test_ids_accept_string_or_number() {
        let a: ChannelId = serde_json::from_str("\"42\"").unwrap();
        let b: ChannelId = serde_json::from_str("42").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<UserId>("\"abc\"").is_err());
        assert!(serde_json::from_str::<UserId>("true").is_err());
    }

    #[test]
    fn test_audio_format_from_itag() {
        let url = "https://rr1.example.com/videoplayback?expire=1&itag=251&mime=audio%2Fwebm";
        assert_eq!(AudioFormat::from_url(url), AudioFormat::Webm);
        assert!(AudioFormat::from_url(url).is_opus_passthrough());
    }

    #[test]
    fn test_audio_format_extension_fallback() {
        assert_eq!(
            AudioFormat::from_url("https://cdn.example.com/a/b/song.MP3?sig=x"),
            AudioFormat::Mp3
        );
        assert_eq!(AudioFormat::from_url("https://cdn.example.com/stream"), AudioFormat::Unknown);
    }
}

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::common::types::{AudioFormat, UserId};

/// A queued request for a track. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRequest {
    pub source_url: String,
    pub title: String,
    pub uploader: String,
    /// Zero for live streams or when the source does not report a length.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub requester: UserId,
}

impl TrackRequest {
    pub fn is_stream(&self) -> bool {
        self.duration.is_zero()
    }

    pub fn view(&self) -> TrackView {
        TrackView {
            title: self.title.clone(),
            uploader: self.uploader.clone(),
            url: self.source_url.clone(),
            duration_secs: self.duration.as_secs(),
            requester: self.requester,
            position_secs: None,
        }
    }
}

/// Where the voice layer pulls audio from once a request is materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHandle {
    pub url: String,
    pub format: AudioFormat,
    /// Headers the media host requires (cookies, user agent).
    pub http_headers: HashMap<String, String>,
}

/// A materialized track, owned by the player loop while it plays.
#[derive(Debug, Clone)]
pub struct Track {
    pub request: TrackRequest,
    pub stream: StreamHandle,
    pub start_offset: Duration,
}

impl Track {
    pub fn new(request: TrackRequest, stream: StreamHandle) -> Self {
        Self {
            request,
            stream,
            start_offset: Duration::ZERO,
        }
    }

    pub fn title(&self) -> &str {
        &self.request.title
    }
}

/// Track as shown to viewers and in local notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackView {
    pub title: String,
    pub uploader: String,
    pub url: String,
    pub duration_secs: u64,
    pub requester: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_secs: Option<u64>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_view_copies_metadata() {
        let request = TrackRequest {
            source_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            title: "Never Gonna Give You Up".to_string(),
            uploader: "Rick Astley".to_string(),
            duration: Duration::from_secs(212),
            requester: UserId(7),
        };
        let view = request.view();
        assert_eq!(view.duration_secs, 212);
        assert_eq!(view.requester, UserId(7));
        assert_eq!(view.position_secs, None);
        assert!(!request.is_stream());
    }

    #[test]
    fn test_request_accepts_fractional_duration() {
        let request: TrackRequest = serde_json::from_value(serde_json::json!({
            "source_url": "https://example.com/a.mp3",
            "title": "a",
            "uploader": "b",
            "duration": 12.7,
            "requester": "5",
        }))
        .unwrap();
        assert_eq!(request.duration.as_secs(), 12);
        assert_eq!(request.requester, UserId(5));
    }
}

//! Resolver backed by the `yt-dlp` command-line extractor.

use std::{collections::HashMap, process::Stdio, sync::LazyLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use super::{plugin::TrackResolver, pool::WorkerPool};
use crate::{
    common::{
        errors::ResolveError,
        types::{AudioFormat, UserId},
    },
    configs::ResolverConfig,
    player::track::{StreamHandle, Track, TrackRequest},
};

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(https?://|www\.)\S+$").expect("static regex"));

pub fn is_url(query: &str) -> bool {
    URL_PATTERN.is_match(query.trim())
}

pub struct YtDlpResolver {
    binary: String,
    default_search: String,
    pool: WorkerPool,
}

impl YtDlpResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            default_search: config.default_search.clone(),
            pool: WorkerPool::new(config.max_workers),
        }
    }

    fn identifier(&self, query: &str) -> String {
        let query = query.trim();
        if is_url(query) {
            query.to_string()
        } else {
            format!("{}:{}", self.default_search, query)
        }
    }

    /// Runs the extractor and parses its JSON. The child is killed if this
    /// future is dropped before it exits.
    async fn dump_json(&self, args: Vec<String>) -> Result<Value, ResolveError> {
        let (binary, args) = (&self.binary, &args);
        self.pool
            .run(|| async move {
                debug!("running {} {:?}", binary, args);
                let output = Command::new(binary)
                    .args(args)
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .output()
                    .await?;
                if !output.status.success() {
                    return Err(ResolveError::ExtractorFailed {
                        status: output.status.to_string(),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                serde_json::from_slice(&output.stdout).map_err(|e| ResolveError::BadOutput(e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requester: UserId) -> Result<TrackRequest, ResolveError> {
        let identifier = self.identifier(query);
        let info = self
            .dump_json(vec![
                "--dump-single-json".into(),
                "--no-warnings".into(),
                "--no-playlist".into(),
                "--flat-playlist".into(),
                "--skip-download".into(),
                identifier,
            ])
            .await?;

        let entry = first_entry(info).ok_or_else(|| ResolveError::NoMatches(query.to_string()))?;
        request_from_info(&entry, requester)
    }

    async fn materialize(&self, request: &TrackRequest) -> Result<Track, ResolveError> {
        let info = self
            .dump_json(vec![
                "--dump-single-json".into(),
                "--no-warnings".into(),
                "--no-playlist".into(),
                "-f".into(),
                "bestaudio/best".into(),
                request.source_url.clone(),
            ])
            .await?;

        let entry = first_entry(info).ok_or_else(|| ResolveError::NoMatches(request.source_url.clone()))?;
        Ok(Track::new(request.clone(), stream_from_info(&entry)?))
    }
}

/// Search results come back as a playlist; single URLs as the entry itself.
fn first_entry(info: Value) -> Option<Value> {
    match info.get("entries") {
        Some(Value::Array(entries)) => entries.iter().find(|e| e.is_object()).cloned(),
        Some(_) => None,
        None => info.is_object().then_some(info),
    }
}

fn str_field<'a>(info: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| info.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

pub(crate) fn request_from_info(info: &Value, requester: UserId) -> Result<TrackRequest, ResolveError> {
    let source_url = str_field(info, &["webpage_url", "original_url", "url"])
        .ok_or_else(|| ResolveError::BadOutput("entry has no url".into()))?
        .to_string();

    let is_live = info.get("is_live").and_then(Value::as_bool).unwrap_or(false);
    let duration = match info.get("duration").and_then(Value::as_f64) {
        Some(secs) if !is_live && secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
        _ => Duration::ZERO,
    };

    Ok(TrackRequest {
        title: str_field(info, &["title", "fulltitle"]).unwrap_or("Unknown title").to_string(),
        uploader: str_field(info, &["uploader", "channel", "artist"])
            .unwrap_or("Unknown")
            .to_string(),
        source_url,
        duration,
        requester,
    })
}

pub(crate) fn stream_from_info(info: &Value) -> Result<StreamHandle, ResolveError> {
    let url = str_field(info, &["url"])
        .ok_or_else(|| ResolveError::BadOutput("no stream url in extractor output".into()))?
        .to_string();

    let format = match str_field(info, &["ext", "audio_ext"]).map(AudioFormat::from_ext) {
        Some(f) if f != AudioFormat::Unknown => f,
        _ => AudioFormat::from_url(&url),
    };

    let http_headers = info
        .get("http_headers")
        .and_then(Value::as_object)
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    Ok(StreamHandle {
        url,
        format,
        http_headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_url("  HTTP://example.com/a.mp3 "));
        assert!(is_url("www.example.com/x"));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("https://example.com/has space"));
    }

    #[test]
    fn test_search_identifier_gets_prefix() {
        let resolver = YtDlpResolver::new(&ResolverConfig::default());
        assert_eq!(resolver.identifier(" lofi beats "), "ytsearch1:lofi beats");
        assert_eq!(resolver.identifier("https://a.b/c"), "https://a.b/c");
    }

    #[tokio::test]
    async fn test_hung_extractor_frees_its_slot() {
        let resolver = YtDlpResolver::new(&ResolverConfig {
            binary: "sleep".into(),
            max_workers: 1,
            ..Default::default()
        });

        let hung = tokio::time::timeout(Duration::from_millis(200), resolver.dump_json(vec!["30".into()])).await;
        assert!(hung.is_err());
        assert_eq!(resolver.pool.available(), 1);

        let quick = tokio::time::timeout(Duration::from_secs(5), resolver.dump_json(vec!["0".into()]))
            .await
            .expect("slot was still held");
        assert!(matches!(quick, Err(ResolveError::BadOutput(_))));
    }

    #[test]
    fn test_first_entry_of_search_results() {
        let info = json!({
            "_type": "playlist",
            "entries": [null, {"url": "https://www.youtube.com/watch?v=abc", "title": "First"}]
        });
        let entry = first_entry(info).unwrap();
        assert_eq!(entry["title"], "First");
        assert!(first_entry(json!({"_type": "playlist", "entries": []})).is_none());
    }

    #[test]
    fn test_request_from_video_info() {
        let info = json!({
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "channel": "Rick Astley",
            "duration": 212.0,
        });
        let request = request_from_info(&info, UserId(3)).unwrap();
        assert_eq!(request.uploader, "Rick Astley");
        assert_eq!(request.duration, Duration::from_secs(212));
        assert_eq!(request.requester, UserId(3));
    }

    #[test]
    fn test_live_streams_have_no_duration() {
        let info = json!({"url": "https://example.com/live", "title": "radio", "is_live": true, "duration": 5.0});
        let request = request_from_info(&info, UserId(1)).unwrap();
        assert!(request.is_stream());
        assert_eq!(request.uploader, "Unknown");
    }

    #[test]
    fn test_stream_from_info() {
        let info = json!({
            "url": "https://rr3.googlevideo.com/videoplayback?itag=251&mime=audio%2Fwebm",
            "ext": "weird",
            "http_headers": {"User-Agent": "Mozilla/5.0", "Accept": 1}
        });
        let stream = stream_from_info(&info).unwrap();
        assert_eq!(stream.format, AudioFormat::Webm);
        assert_eq!(stream.http_headers.get("User-Agent").map(String::as_str), Some("Mozilla/5.0"));
        assert!(!stream.http_headers.contains_key("Accept"));
        assert!(stream_from_info(&json!({"title": "x"})).is_err());
    }
}

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use groovelink::{
    common::{
        errors::ResolveError,
        types::{AudioFormat, ChannelId, GuildId, UserId},
    },
    configs::Config,
    notify::{Notice, NoticeId, Notifier, TracingActivitySink},
    player::{StreamHandle, Track, TrackRequest, TrackView},
    server::{AppState, Collaborators},
    sources::TrackResolver,
    storage::MemoryPlaylistStore,
    voice::HeadlessPlatform,
};
use parking_lot::Mutex;

pub const GUILD: GuildId = GuildId(100);
pub const CHANNEL: ChannelId = ChannelId(200);
pub const DJ: UserId = UserId(1);
pub const LISTENER: UserId = UserId(2);

/// Resolves any query to a track titled after it.
#[derive(Default)]
pub struct FakeResolver {
    durations: Mutex<HashMap<String, Duration>>,
    broken: Mutex<HashSet<String>>,
}

impl FakeResolver {
    pub fn with_duration(&self, title: &str, duration: Duration) {
        self.durations.lock().insert(title.to_string(), duration);
    }

    /// `materialize` fails for this title.
    pub fn break_title(&self, title: &str) {
        self.broken.lock().insert(title.to_string());
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str, requester: UserId) -> Result<TrackRequest, ResolveError> {
        if query == "nothing" {
            return Err(ResolveError::NoMatches(query.to_string()));
        }
        let duration = self
            .durations
            .lock()
            .get(query)
            .copied()
            .unwrap_or(Duration::from_secs(30));
        Ok(TrackRequest {
            source_url: format!("https://media.example.com/{}", query),
            title: query.to_string(),
            uploader: "tester".to_string(),
            duration,
            requester,
        })
    }

    async fn materialize(&self, request: &TrackRequest) -> Result<Track, ResolveError> {
        if self.broken.lock().contains(&request.title) {
            return Err(ResolveError::ExtractorFailed {
                status: "exit status: 1".to_string(),
                stderr: "ERROR: Video unavailable".to_string(),
            });
        }
        Ok(Track::new(
            request.clone(),
            StreamHandle {
                url: format!("{}.webm", request.source_url),
                format: AudioFormat::Webm,
                http_headers: Default::default(),
            },
        ))
    }
}

/// Keeps every notice for inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
    now_playing: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Notice) -> bool) -> usize {
        self.notices.lock().iter().filter(|n| pred(n)).count()
    }

    pub fn now_playing(&self) -> Vec<String> {
        self.now_playing.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notice(&self, _guild_id: GuildId, _channel_id: ChannelId, notice: Notice) {
        self.notices.lock().push(notice);
    }

    fn now_playing(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
        track: &TrackView,
        _replaces: Option<NoticeId>,
    ) -> Option<NoticeId> {
        let mut posted = self.now_playing.lock();
        posted.push(track.title.clone());
        Some(NoticeId(posted.len() as u64))
    }

    fn presence(&self, _track: Option<&TrackView>) {}
}

pub struct Fixture {
    pub state: Arc<AppState>,
    pub platform: Arc<HeadlessPlatform>,
    pub resolver: Arc<FakeResolver>,
    pub notifier: Arc<RecordingNotifier>,
    pub playlists: Arc<MemoryPlaylistStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// One guild with one channel holding the DJ and a listener.
    pub fn with_config(config: Config) -> Self {
        let platform = Arc::new(HeadlessPlatform::new());
        platform.add_channel(GUILD, CHANNEL);
        platform.join_member(GUILD, CHANNEL, DJ);
        platform.join_member(GUILD, CHANNEL, LISTENER);

        let resolver = Arc::new(FakeResolver::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let playlists = Arc::new(MemoryPlaylistStore::new());

        let state = AppState::new(
            config,
            Collaborators {
                platform: platform.clone(),
                resolver: resolver.clone(),
                notifier: notifier.clone(),
                activity: Arc::new(TracingActivitySink),
                playlists: playlists.clone(),
            },
        );

        Self {
            state,
            platform,
            resolver,
            notifier,
            playlists,
        }
    }
}

pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

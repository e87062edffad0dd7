use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::{
    equalizer::Equalizer,
    track::{Track, TrackRequest, TrackView},
};
use crate::{
    common::types::{ChannelId, GuildId, UserId},
    notify::NoticeId,
    voice::VoiceConnection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Connected, nothing played yet.
    Empty,
    Playing,
    Paused,
    /// Queue ran dry with loop off; waiting for work or the idle timeout.
    Draining,
    Terminated,
}

impl SessionStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// A stored playlist being played through, one entry at a time.
#[derive(Debug, Clone)]
pub struct PlaylistContext {
    pub playlist_id: String,
    pub tracks: Vec<TrackRequest>,
    /// Next entry to hand out.
    pub index: usize,
}

impl PlaylistContext {
    pub fn remaining(&self) -> usize {
        self.tracks.len().saturating_sub(self.index)
    }

    fn advance(&mut self) -> Option<TrackRequest> {
        let next = self.tracks.get(self.index).cloned();
        if next.is_some() {
            self.index += 1;
        }
        next
    }
}

/// Full state sent to viewers. Always complete, never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub status: SessionStatus,
    pub current: Option<TrackView>,
    pub queue: Vec<TrackView>,
    pub history: Vec<TrackView>,
    pub volume: u8,
    pub loop_enabled: bool,
    pub shuffle_enabled: bool,
    pub equalizer: Equalizer,
    pub dj: UserId,
    pub playlist_id: Option<String>,
}

/// Mutable fields of a session. Only touched with the session lock held,
/// and the lock is never held across an await.
pub(crate) struct SessionState {
    pub status: SessionStatus,
    pub queue: VecDeque<TrackRequest>,
    pub current: Option<Track>,
    pub connection: Option<Arc<dyn VoiceConnection>>,
    pub owning_dj: UserId,
    pub authorized_djs: HashSet<UserId>,
    pub loop_enabled: bool,
    pub shuffle_enabled: bool,
    pub volume: u8,
    pub equalizer: Equalizer,
    pub playlist: Option<PlaylistContext>,
    pub history: VecDeque<TrackRequest>,
    pub history_size: usize,
    pub last_status_message: Option<NoticeId>,
}

impl SessionState {
    pub fn new(owning_dj: UserId, connection: Arc<dyn VoiceConnection>, history_size: usize) -> Self {
        Self {
            status: SessionStatus::Empty,
            queue: VecDeque::new(),
            current: None,
            connection: Some(connection),
            owning_dj,
            authorized_djs: HashSet::from([owning_dj]),
            loop_enabled: false,
            shuffle_enabled: false,
            volume: 100,
            equalizer: Equalizer::default(),
            playlist: None,
            history: VecDeque::new(),
            history_size,
            last_status_message: None,
        }
    }

    pub fn is_dj(&self, user_id: UserId) -> bool {
        self.owning_dj == user_id || self.authorized_djs.contains(&user_id)
    }

    /// Explicit queue first, then the playlist continuation.
    pub fn take_next(&mut self) -> Option<TrackRequest> {
        if let Some(next) = self.queue.pop_front() {
            return Some(next);
        }
        self.playlist.as_mut().and_then(PlaylistContext::advance)
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty() || self.playlist.as_ref().is_some_and(|p| p.remaining() > 0)
    }

    pub fn push_history(&mut self, request: TrackRequest) {
        self.history.push_front(request);
        self.history.truncate(self.history_size);
    }

    pub fn shuffle_queue(&mut self) {
        self.queue.make_contiguous().shuffle(&mut rand::thread_rng());
    }

    /// Moves the entry at `index` to the front of the queue.
    pub fn jump_to(&mut self, index: usize) -> Option<&TrackRequest> {
        let entry = self.queue.remove(index)?;
        self.queue.push_front(entry);
        self.queue.front()
    }

    pub fn queue_views(&self) -> Vec<TrackView> {
        self.queue.iter().map(TrackRequest::view).collect()
    }

    pub fn snapshot(&self, guild_id: GuildId, channel_id: ChannelId) -> SessionSnapshot {
        let position = self.connection.as_ref().map(|c| c.position().as_secs());
        SessionSnapshot {
            session_id: channel_id.to_string(),
            guild_id,
            channel_id,
            status: self.status,
            current: self.current.as_ref().map(|t| TrackView {
                position_secs: position,
                ..t.request.view()
            }),
            queue: self.queue_views(),
            history: self.history.iter().map(TrackRequest::view).collect(),
            volume: self.volume,
            loop_enabled: self.loop_enabled,
            shuffle_enabled: self.shuffle_enabled,
            equalizer: self.equalizer.clone(),
            dj: self.owning_dj,
            playlist_id: self.playlist.as_ref().map(|p| p.playlist_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{HeadlessPlatform, VoicePlatform};
    use std::time::Duration;

    fn request(title: &str) -> TrackRequest {
        TrackRequest {
            source_url: format!("https://example.com/{}", title),
            title: title.to_string(),
            uploader: "u".to_string(),
            duration: Duration::from_secs(30),
            requester: UserId(1),
        }
    }

    async fn state() -> SessionState {
        let platform = HeadlessPlatform::new();
        platform.add_channel(GuildId(1), ChannelId(2));
        let conn = platform.connect(GuildId(1), ChannelId(2)).await.unwrap();
        SessionState::new(UserId(1), conn, 3)
    }

    #[tokio::test]
    async fn test_queue_is_fifo_before_playlist() {
        let mut s = state().await;
        s.playlist = Some(PlaylistContext {
            playlist_id: "p".into(),
            tracks: vec![request("p1"), request("p2")],
            index: 0,
        });
        s.queue.push_back(request("a"));
        s.queue.push_back(request("b"));

        let order: Vec<String> = std::iter::from_fn(|| s.take_next()).map(|r| r.title).collect();
        assert_eq!(order, vec!["a", "b", "p1", "p2"]);
        assert!(!s.has_pending());
        assert_eq!(s.playlist.as_ref().unwrap().index, 2);
    }

    #[tokio::test]
    async fn test_history_is_bounded_newest_first() {
        let mut s = state().await;
        for t in ["a", "b", "c", "d"] {
            s.push_history(request(t));
        }
        let titles: Vec<&str> = s.history.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["d", "c", "b"]);
    }

    #[tokio::test]
    async fn test_jump_moves_entry_to_front() {
        let mut s = state().await;
        for t in ["a", "b", "c"] {
            s.queue.push_back(request(t));
        }
        assert_eq!(s.jump_to(2).map(|r| r.title.clone()), Some("c".to_string()));
        let titles: Vec<&str> = s.queue.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
        assert!(s.jump_to(5).is_none());
    }

    #[tokio::test]
    async fn test_shuffle_keeps_entries() {
        let mut s = state().await;
        for i in 0..20 {
            s.queue.push_back(request(&i.to_string()));
        }
        s.shuffle_queue();
        let mut titles: Vec<String> = s.queue.iter().map(|r| r.title.clone()).collect();
        titles.sort_by_key(|t| t.parse::<u32>().unwrap());
        assert_eq!(titles, (0..20).map(|i| i.to_string()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_snapshot_reports_session_id_as_channel() {
        let s = state().await;
        let snap = s.snapshot(GuildId(1), ChannelId(2));
        assert_eq!(snap.session_id, "2");
        assert_eq!(snap.status, SessionStatus::Empty);
        assert_eq!(snap.dj, UserId(1));
        assert!(snap.current.is_none());
    }
}

//! Local side effects of session state changes: chat notices, the bot's
//! rich presence, and activity events for the economy layer.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

use crate::{
    common::types::{ChannelId, GuildId, UserId},
    player::track::TrackView,
};

pub mod activity;

pub use activity::{ActivityEvent, ActivitySink, TracingActivitySink};

/// Opaque handle to a posted status message, so a later one can replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    IdleTimeout,
    ChannelEmpty,
    Stopped,
    ReconnectExhausted,
}

impl TerminationReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::IdleTimeout => "nothing queued for a while, leaving the channel",
            Self::ChannelEmpty => "everyone left, leaving the channel",
            Self::Stopped => "playback stopped",
            Self::ReconnectExhausted => "lost the voice connection and could not get it back",
        }
    }
}

/// One user-visible notice posted to the session's text channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Joined { dj: UserId },
    DjPromoted { dj: UserId },
    DjTransferred { previous: UserId, dj: UserId },
    TrackSkipped { title: String, reason: String },
    QueueFinished,
    Left { reason: TerminationReason },
}

/// Posts notices and the now-playing card. Implemented by the chat layer.
pub trait Notifier: Send + Sync {
    fn notice(&self, guild_id: GuildId, channel_id: ChannelId, notice: Notice);

    /// Posts (or replaces) the now-playing card and returns its handle.
    fn now_playing(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        track: &TrackView,
        replaces: Option<NoticeId>,
    ) -> Option<NoticeId>;

    /// Mirrors the current track into the bot's rich presence. `None` clears it.
    fn presence(&self, track: Option<&TrackView>);
}

/// Writes notices to the log. Used when no chat layer is attached.
#[derive(Default)]
pub struct LogNotifier {
    next_id: AtomicU64,
}

impl Notifier for LogNotifier {
    fn notice(&self, guild_id: GuildId, channel_id: ChannelId, notice: Notice) {
        match notice {
            Notice::Joined { dj } => info!("[{}/{}] joined, DJ is {}", guild_id, channel_id, dj),
            Notice::DjPromoted { dj } => info!("[{}/{}] {} is now the DJ", guild_id, channel_id, dj),
            Notice::DjTransferred { previous, dj } => info!(
                "[{}/{}] DJ {} left, {} takes over",
                guild_id, channel_id, previous, dj
            ),
            Notice::TrackSkipped { title, reason } => {
                info!("[{}/{}] skipped `{}`: {}", guild_id, channel_id, title, reason)
            }
            Notice::QueueFinished => info!("[{}/{}] queue finished", guild_id, channel_id),
            Notice::Left { reason } => {
                info!("[{}/{}] {}", guild_id, channel_id, reason.describe())
            }
        }
    }

    fn now_playing(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        track: &TrackView,
        _replaces: Option<NoticeId>,
    ) -> Option<NoticeId> {
        info!(
            "[{}/{}] now playing `{}` by {}",
            guild_id, channel_id, track.title, track.uploader
        );
        Some(NoticeId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    fn presence(&self, track: Option<&TrackView>) {
        match track {
            Some(t) => info!("presence: listening to {}", t.title),
            None => info!("presence: cleared"),
        }
    }
}

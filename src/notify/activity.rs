use std::time::Duration;

use tracing::debug;

use crate::common::types::{ChannelId, GuildId, UserId};

use super::TerminationReason;

/// Events the engine reports to the scoring/achievement layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    TrackPlayed {
        guild_id: GuildId,
        requester: UserId,
        title: String,
        listened: Duration,
    },
    DjAssigned {
        guild_id: GuildId,
        user_id: UserId,
    },
    SessionEnded {
        guild_id: GuildId,
        channel_id: ChannelId,
        reason: TerminationReason,
    },
}

pub trait ActivitySink: Send + Sync {
    fn record(&self, event: ActivityEvent);
}

#[derive(Default)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, event: ActivityEvent) {
        debug!(?event, "activity");
    }
}

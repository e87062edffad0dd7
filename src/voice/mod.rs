//! Seam to the chat platform's voice layer.
//!
//! The engine only orchestrates: joining channels, starting and stopping
//! playback, and reading presence. Decoding and transport live behind
//! these traits.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    common::{
        errors::VoiceError,
        types::{ChannelId, GuildId, UserId},
    },
    player::{equalizer::Equalizer, track::Track},
};

pub mod headless;

pub use headless::{HeadlessConnection, HeadlessPlatform};

/// What a connection reports about its audio output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Playing,
    Paused,
    Idle,
}

impl ConnectionStatus {
    /// Playing or paused; anything else means the current track is over.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelPermissions {
    pub connect: bool,
    pub speak: bool,
}

impl ChannelPermissions {
    pub const ALL: Self = Self {
        connect: true,
        speak: true,
    };

    pub fn can_play(&self) -> bool {
        self.connect && self.speak
    }
}

/// A live voice connection in one channel.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    fn is_connected(&self) -> bool;

    fn status(&self) -> ConnectionStatus;

    /// Playback position of the current track.
    fn position(&self) -> Duration;

    /// Starts streaming `track`, replacing whatever was playing.
    async fn play(&self, track: &Track) -> Result<(), VoiceError>;

    fn pause(&self);

    fn resume(&self);

    /// Ends the current track. `status()` reports `Idle` afterwards.
    fn stop(&self);

    fn set_volume(&self, volume: u8);

    fn set_equalizer(&self, equalizer: &Equalizer);

    /// Force-closes the connection.
    fn disconnect(&self);
}

/// Platform operations the engine needs outside a connection.
#[async_trait]
pub trait VoicePlatform: Send + Sync {
    fn permissions(&self, guild_id: GuildId, channel_id: ChannelId) -> ChannelPermissions;

    /// Non-bot members currently in `channel_id`.
    fn humans_in(&self, guild_id: GuildId, channel_id: ChannelId) -> Vec<UserId>;

    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError>;
}

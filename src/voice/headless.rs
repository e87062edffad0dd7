//! In-process voice platform that simulates channels, members and timed
//! playback. Used when no chat platform is attached and by the tests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{ChannelPermissions, ConnectionStatus, VoiceConnection, VoicePlatform};
use crate::{
    common::{
        errors::VoiceError,
        types::{ChannelId, GuildId, UserId},
    },
    player::{equalizer::Equalizer, track::Track},
};

#[derive(Default)]
pub struct HeadlessPlatform {
    channels: DashMap<(GuildId, ChannelId), ChannelPermissions>,
    members: DashMap<(GuildId, UserId), ChannelId>,
    connections: DashMap<(GuildId, ChannelId), Arc<HeadlessConnection>>,
    failing_connects: AtomicU32,
    connect_delay: Mutex<Option<Duration>>,
    play_log: Arc<Mutex<Vec<String>>>,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert((guild_id, channel_id), ChannelPermissions::ALL);
    }

    pub fn set_permissions(&self, guild_id: GuildId, channel_id: ChannelId, perms: ChannelPermissions) {
        self.channels.insert((guild_id, channel_id), perms);
    }

    /// Moves `user_id` into `channel_id`, leaving any previous channel.
    pub fn join_member(&self, guild_id: GuildId, channel_id: ChannelId, user_id: UserId) {
        self.members.insert((guild_id, user_id), channel_id);
    }

    pub fn leave_member(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.members.remove(&(guild_id, user_id)).map(|(_, c)| c)
    }

    /// Makes the next `n` connect attempts fail with a handshake error.
    pub fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Delays every connect attempt, to exercise connect timeouts.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.connect_delay.lock() = delay;
    }

    pub fn connection(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<Arc<HeadlessConnection>> {
        self.connections.get(&(guild_id, channel_id)).map(|c| c.clone())
    }

    /// Titles in the order playback started, across all connections.
    pub fn played_titles(&self) -> Vec<String> {
        self.play_log.lock().clone()
    }
}

#[async_trait]
impl VoicePlatform for HeadlessPlatform {
    fn permissions(&self, guild_id: GuildId, channel_id: ChannelId) -> ChannelPermissions {
        self.channels
            .get(&(guild_id, channel_id))
            .map(|p| *p)
            .unwrap_or_default()
    }

    fn humans_in(&self, guild_id: GuildId, channel_id: ChannelId) -> Vec<UserId> {
        let mut humans: Vec<UserId> = self
            .members
            .iter()
            .filter(|e| e.key().0 == guild_id && *e.value() == channel_id)
            .map(|e| e.key().1)
            .collect();
        humans.sort();
        humans
    }

    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.members.get(&(guild_id, user_id)).map(|c| *c)
    }

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(VoiceError::Handshake("simulated handshake failure".into()));
        }

        if !self.channels.contains_key(&(guild_id, channel_id)) {
            return Err(VoiceError::UnknownChannel(channel_id));
        }

        let conn = Arc::new(HeadlessConnection::new(channel_id, self.play_log.clone()));
        if let Some(old) = self.connections.insert((guild_id, channel_id), conn.clone()) {
            old.disconnect();
        }
        debug!("[{}] headless voice connected to {}", guild_id, channel_id);
        Ok(conn)
    }
}

#[derive(Default)]
struct Playback {
    length: Duration,
    started: Option<Instant>,
    played_before: Duration,
    paused: bool,
    active: bool,
}

impl Playback {
    fn elapsed(&self) -> Duration {
        self.played_before + self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn finished(&self) -> bool {
        !self.active || (!self.length.is_zero() && self.elapsed() >= self.length)
    }
}

pub struct HeadlessConnection {
    channel_id: ChannelId,
    connected: AtomicBool,
    volume: AtomicU8,
    equalizer: Mutex<Equalizer>,
    playback: Mutex<Playback>,
    play_log: Arc<Mutex<Vec<String>>>,
}

impl HeadlessConnection {
    fn new(channel_id: ChannelId, play_log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            channel_id,
            connected: AtomicBool::new(true),
            volume: AtomicU8::new(100),
            equalizer: Mutex::new(Equalizer::default()),
            playback: Mutex::new(Playback::default()),
            play_log,
        }
    }

    /// Simulates the platform dropping the connection.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::SeqCst)
    }

    pub fn equalizer(&self) -> Equalizer {
        self.equalizer.lock().clone()
    }
}

#[async_trait]
impl VoiceConnection for HeadlessConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> ConnectionStatus {
        if !self.is_connected() {
            return ConnectionStatus::Idle;
        }
        let playback = self.playback.lock();
        if playback.finished() {
            ConnectionStatus::Idle
        } else if playback.paused {
            ConnectionStatus::Paused
        } else {
            ConnectionStatus::Playing
        }
    }

    fn position(&self) -> Duration {
        let playback = self.playback.lock();
        if playback.length.is_zero() {
            playback.elapsed()
        } else {
            playback.elapsed().min(playback.length)
        }
    }

    async fn play(&self, track: &Track) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::Disconnected);
        }
        *self.playback.lock() = Playback {
            length: track.request.duration,
            started: Some(Instant::now()),
            played_before: track.start_offset,
            paused: false,
            active: true,
        };
        self.play_log.lock().push(track.title().to_string());
        Ok(())
    }

    fn pause(&self) {
        let mut playback = self.playback.lock();
        if playback.paused || playback.finished() {
            return;
        }
        playback.played_before = playback.elapsed();
        playback.started = None;
        playback.paused = true;
    }

    fn resume(&self) {
        let mut playback = self.playback.lock();
        if !playback.paused {
            return;
        }
        playback.started = Some(Instant::now());
        playback.paused = false;
    }

    fn stop(&self) {
        let mut playback = self.playback.lock();
        playback.played_before = playback.elapsed();
        playback.started = None;
        playback.active = false;
    }

    fn set_volume(&self, volume: u8) {
        self.volume.store(volume, Ordering::SeqCst);
    }

    fn set_equalizer(&self, equalizer: &Equalizer) {
        *self.equalizer.lock() = equalizer.clone();
    }

    fn disconnect(&self) {
        self.stop();
        self.connected.store(false, Ordering::SeqCst);
    }
}

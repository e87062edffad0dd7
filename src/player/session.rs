//! One playback session per voice channel.
//!
//! All mutable state sits behind a single lock that is never held across an
//! await. Every mutation happens in one locked step, and its broadcast is sent
//! right after the lock is released and before the next await. Viewers
//! therefore see mutations in the order they happened.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    backoff::Backoff,
    state::{PlaylistContext, SessionSnapshot, SessionState, SessionStatus},
    track::{Track, TrackRequest, TrackView},
};
use crate::{
    common::{
        errors::SessionError,
        types::{ChannelId, GuildId, UserId},
    },
    configs::PlayerConfig,
    gateway::SubscriberHub,
    notify::{ActivityEvent, ActivitySink, Notice, Notifier, TerminationReason},
    protocol::OutgoingMessage,
    server::registry::SessionRegistry,
    sources::TrackResolver,
    storage::{Playlist, PlaylistStore, StoredTrack},
    voice::{VoiceConnection, VoicePlatform},
};

/// Retries a stale connection gets before the session gives up, on top of
/// the reconnect time budget.
const RECONNECT_RETRIES: u32 = 6;

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub config: Arc<PlayerConfig>,
    pub platform: Arc<dyn VoicePlatform>,
    pub resolver: Arc<dyn TrackResolver>,
    pub notifier: Arc<dyn Notifier>,
    pub activity: Arc<dyn ActivitySink>,
    pub playlists: Arc<dyn PlaylistStore>,
    pub hub: Arc<SubscriberHub>,
    pub registry: Arc<SessionRegistry>,
}

/// What happened to a session when a member left its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Someone other than the DJ left and listeners remain.
    Unaffected,
    Transferred { previous: UserId, dj: UserId },
    /// Nobody is left; the session ended.
    Terminated,
}

pub struct Session {
    pub guild_id: GuildId,
    /// Also the session's identity on the wire.
    pub channel_id: ChannelId,
    pub(super) state: Mutex<SessionState>,
    pub(super) wake: Notify,
    pub(super) loop_running: AtomicBool,
    pub(super) cancel: CancellationToken,
    pub(super) deps: SessionDeps,
    pub(super) me: Weak<Session>,
}

impl Session {
    /// Connects to `channel_id` and builds a session owned by `requester`.
    ///
    /// The session is not registered; the caller decides whether it wins a
    /// race against a concurrent join.
    pub async fn connect(
        deps: SessionDeps,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: UserId,
    ) -> Result<Arc<Self>, SessionError> {
        if !deps.platform.permissions(guild_id, channel_id).can_play() {
            return Err(SessionError::PermissionDenied(channel_id));
        }

        let connection = connect_with_retry(&deps, guild_id, channel_id).await?;
        let history_size = deps.config.history_size;

        Ok(Arc::new_cyclic(|me| Self {
            guild_id,
            channel_id,
            state: Mutex::new(SessionState::new(requester, connection, history_size)),
            wake: Notify::new(),
            loop_running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            deps,
            me: me.clone(),
        }))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().snapshot(self.guild_id, self.channel_id)
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn is_terminated(&self) -> bool {
        self.status() == SessionStatus::Terminated
    }

    pub fn owning_dj(&self) -> UserId {
        self.state.lock().owning_dj
    }

    pub fn is_dj(&self, user_id: UserId) -> bool {
        self.state.lock().is_dj(user_id)
    }

    pub fn is_player_loop_running(&self) -> bool {
        self.loop_running.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn current_track(&self) -> Option<TrackView> {
        self.state.lock().current.as_ref().map(|t| t.request.view())
    }

    /// Appends a resolved request to the queue and wakes the player loop.
    /// Returns the request's zero-based queue position.
    pub fn enqueue(&self, request: TrackRequest) -> Result<usize, SessionError> {
        let (position, queue) = self.mutate(|s| {
            debug!("[{}] queued `{}`", self.channel_id, request.title);
            s.queue.push_back(request);
            Ok((s.queue.len() - 1, s.queue_views()))
        })?;
        self.deps.hub.broadcast(self.channel_id, &OutgoingMessage::PlaylistUpdated { queue });
        self.wake.notify_one();
        self.start_player_loop();
        Ok(position)
    }

    /// Makes `user_id` the owning DJ. The previous owner keeps DJ rights.
    pub fn promote_dj(&self, user_id: UserId) -> Result<(), SessionError> {
        let snapshot = self.mutate(|s| {
            s.owning_dj = user_id;
            s.authorized_djs.insert(user_id);
            Ok(s.snapshot(self.guild_id, self.channel_id))
        })?;
        info!("[{}] {} promoted to DJ", self.channel_id, user_id);
        self.deps
            .notifier
            .notice(self.guild_id, self.channel_id, Notice::DjPromoted { dj: user_id });
        self.deps.activity.record(ActivityEvent::DjAssigned {
            guild_id: self.guild_id,
            user_id,
        });
        self.broadcast_state(snapshot);
        Ok(())
    }

    /// Reacts to `departed` leaving the channel: ends the session when no
    /// listeners remain, hands the DJ role to a random listener when the DJ
    /// left, and does nothing otherwise.
    pub fn handle_departure(&self, departed: UserId) -> Departure {
        if self.is_terminated() {
            return Departure::Unaffected;
        }

        let remaining: Vec<UserId> = self
            .deps
            .platform
            .humans_in(self.guild_id, self.channel_id)
            .into_iter()
            .filter(|u| *u != departed)
            .collect();

        if remaining.is_empty() {
            self.terminate(TerminationReason::ChannelEmpty);
            return Departure::Terminated;
        }

        let transfer = {
            let mut s = self.state.lock();
            if s.status == SessionStatus::Terminated || s.owning_dj != departed {
                None
            } else {
                let Some(dj) = remaining.choose(&mut rand::thread_rng()).copied() else {
                    return Departure::Unaffected;
                };
                s.authorized_djs.remove(&departed);
                s.owning_dj = dj;
                s.authorized_djs.insert(dj);
                Some((dj, s.snapshot(self.guild_id, self.channel_id)))
            }
        };

        let Some((dj, snapshot)) = transfer else {
            return Departure::Unaffected;
        };

        info!("[{}] DJ {} left, {} takes over", self.channel_id, departed, dj);
        self.deps.notifier.notice(
            self.guild_id,
            self.channel_id,
            Notice::DjTransferred { previous: departed, dj },
        );
        self.deps.activity.record(ActivityEvent::DjAssigned {
            guild_id: self.guild_id,
            user_id: dj,
        });
        self.broadcast_state(snapshot);
        Departure::Transferred { previous: departed, dj }
    }

    /// Ends the session: stops the player loop, leaves the channel, tells
    /// viewers, and removes it from the registry. Returns `false` when it
    /// had already ended.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        let (connection, snapshot) = {
            let mut s = self.state.lock();
            if s.status == SessionStatus::Terminated {
                return false;
            }
            s.status = SessionStatus::Terminated;
            s.queue.clear();
            s.playlist = None;
            s.current = None;
            let snapshot = s.snapshot(self.guild_id, self.channel_id);
            (s.connection.take(), snapshot)
        };

        self.cancel.cancel();
        if let Some(connection) = connection {
            connection.disconnect();
        }
        self.deps.registry.remove(self);

        info!("[{}] session terminated: {:?}", self.channel_id, reason);
        self.deps
            .notifier
            .notice(self.guild_id, self.channel_id, Notice::Left { reason });
        self.deps.notifier.presence(None);
        self.deps.activity.record(ActivityEvent::SessionEnded {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            reason,
        });

        self.broadcast_state(snapshot);
        self.deps.hub.unbind_session(self.channel_id);
        true
    }

    /// Drops a session that lost a join race. No notices, no broadcasts.
    pub(crate) fn abandon(&self) {
        let connection = {
            let mut s = self.state.lock();
            s.status = SessionStatus::Terminated;
            s.connection.take()
        };
        self.cancel.cancel();
        if let Some(connection) = connection {
            connection.disconnect();
        }
    }

    /// Starts playing through a stored playlist once the explicit queue is
    /// empty. Private playlists only load for their creator.
    pub async fn load_playlist(&self, playlist_id: &str, requester: UserId) -> Result<usize, SessionError> {
        let playlist = self
            .deps
            .playlists
            .fetch(playlist_id)
            .await?
            .filter(|p| p.visible_to(requester))
            .ok_or_else(|| SessionError::InvalidArgument(format!("playlist `{}` not found", playlist_id)))?;

        if playlist.track_data.is_empty() {
            return Err(SessionError::InvalidArgument(format!(
                "playlist `{}` is empty",
                playlist.name
            )));
        }

        let tracks: Vec<TrackRequest> = playlist
            .track_data
            .into_iter()
            .map(|t| t.into_request(requester))
            .collect();
        let count = tracks.len();

        let snapshot = self.mutate(|s| {
            s.playlist = Some(PlaylistContext {
                playlist_id: playlist.playlist_id.clone(),
                tracks,
                index: 0,
            });
            Ok(s.snapshot(self.guild_id, self.channel_id))
        })?;

        info!(
            "[{}] loaded playlist `{}` ({} tracks)",
            self.channel_id, playlist.name, count
        );
        self.broadcast_state(snapshot);
        self.wake.notify_one();
        self.start_player_loop();
        Ok(count)
    }

    /// Persists the current track plus the queue as a new playlist and
    /// returns its id.
    pub async fn save_queue_as_playlist(
        &self,
        name: &str,
        creator_id: UserId,
        is_public: bool,
    ) -> Result<String, SessionError> {
        let tracks = self.stored_tracks()?;
        if tracks.is_empty() {
            return Err(SessionError::InvalidArgument("nothing to save".to_string()));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidArgument("playlist name is empty".to_string()));
        }

        let playlist_id = uuid::Uuid::new_v4().simple().to_string();
        self.deps
            .playlists
            .create(Playlist {
                playlist_id: playlist_id.clone(),
                name: name.to_string(),
                creator_id,
                guild_id: self.guild_id,
                is_public,
                track_data: tracks,
            })
            .await?;
        info!("[{}] saved queue as playlist `{}`", self.channel_id, name);
        Ok(playlist_id)
    }

    /// Appends the current track to a playlist the caller created.
    pub async fn append_current_to_playlist(&self, playlist_id: &str, user_id: UserId) -> Result<(), SessionError> {
        let track = {
            let s = self.state.lock();
            s.current.as_ref().map(|t| StoredTrack::from(&t.request))
        }
        .ok_or_else(|| SessionError::InvalidArgument("nothing is playing".to_string()))?;

        let owned = self
            .deps
            .playlists
            .fetch(playlist_id)
            .await?
            .is_some_and(|p| p.creator_id == user_id);
        if !owned {
            return Err(SessionError::InvalidArgument(format!(
                "playlist `{}` not found",
                playlist_id
            )));
        }

        self.deps.playlists.append_tracks(playlist_id, vec![track]).await?;
        Ok(())
    }

    /// Replaces a playlist the caller created with the current track plus
    /// the queue. Returns the new track count.
    pub async fn overwrite_playlist(&self, playlist_id: &str, user_id: UserId) -> Result<usize, SessionError> {
        let tracks = self.stored_tracks()?;
        if tracks.is_empty() {
            return Err(SessionError::InvalidArgument("nothing to save".to_string()));
        }

        let owned = self
            .deps
            .playlists
            .fetch(playlist_id)
            .await?
            .is_some_and(|p| p.creator_id == user_id);
        if !owned {
            return Err(SessionError::InvalidArgument(format!(
                "playlist `{}` not found",
                playlist_id
            )));
        }

        let count = tracks.len();
        self.deps.playlists.replace_tracks(playlist_id, tracks).await?;
        info!("[{}] overwrote playlist `{}` ({} tracks)", self.channel_id, playlist_id, count);
        Ok(count)
    }

    fn stored_tracks(&self) -> Result<Vec<StoredTrack>, SessionError> {
        let s = self.state.lock();
        if s.status == SessionStatus::Terminated {
            return Err(SessionError::NotFound(self.channel_id));
        }
        Ok(s.current
            .iter()
            .map(|t| StoredTrack::from(&t.request))
            .chain(s.queue.iter().map(StoredTrack::from))
            .collect())
    }

    /// Runs `f` under the session lock unless the session already ended.
    pub(super) fn mutate<T>(
        &self,
        f: impl FnOnce(&mut SessionState) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut s = self.state.lock();
        if s.status == SessionStatus::Terminated {
            return Err(SessionError::NotFound(self.channel_id));
        }
        f(&mut s)
    }

    pub(super) fn broadcast_state(&self, state: SessionSnapshot) {
        self.deps
            .hub
            .broadcast(self.channel_id, &OutgoingMessage::NowPlaying { state });
    }

    pub(super) fn broadcast_queue(&self, queue: Vec<TrackView>) {
        self.deps
            .hub
            .broadcast(self.channel_id, &OutgoingMessage::PlaylistUpdated { queue });
    }

    pub(super) fn connection(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.state.lock().connection.clone()
    }

    /// Returns a live connection, re-establishing a stale one within the
    /// reconnect budget.
    pub(super) async fn ensure_connection(&self) -> Result<Arc<dyn VoiceConnection>, SessionError> {
        if let Some(conn) = self.connection().filter(|c| c.is_connected()) {
            return Ok(conn);
        }

        warn!("[{}] voice connection is stale, reconnecting", self.channel_id);
        let budget = self.deps.config.reconnect_budget();
        match tokio::time::timeout(budget, self.reconnect()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[{}] reconnect budget of {:?} exhausted",
                    self.channel_id, budget
                );
                Err(SessionError::StaleConnection)
            }
        }
    }

    async fn reconnect(&self) -> Result<Arc<dyn VoiceConnection>, SessionError> {
        let config = &self.deps.config;
        let mut backoff = Backoff::exponential(config.connect_backoff(), RECONNECT_RETRIES);

        loop {
            if let Some(target) = self.reconnect_target() {
                let attempt = tokio::time::timeout(
                    config.connect_timeout(),
                    self.deps.platform.connect(self.guild_id, target),
                )
                .await;
                match attempt {
                    Ok(Ok(conn)) => return self.install_connection(conn),
                    Ok(Err(e)) => warn!("[{}] reconnect to {} failed: {}", self.channel_id, target, e),
                    Err(_) => warn!("[{}] reconnect to {} timed out", self.channel_id, target),
                }
            } else {
                debug!("[{}] no listener to reconnect to", self.channel_id);
            }

            if backoff.is_exhausted() {
                return Err(SessionError::StaleConnection);
            }
            tokio::time::sleep(backoff.next()).await;
        }
    }

    /// The session's own channel while it has listeners, otherwise the
    /// channel of any DJ still in voice.
    fn reconnect_target(&self) -> Option<ChannelId> {
        let platform = &self.deps.platform;
        if !platform.humans_in(self.guild_id, self.channel_id).is_empty() {
            return Some(self.channel_id);
        }

        let mut djs: Vec<UserId> = {
            let s = self.state.lock();
            let mut others: Vec<UserId> = s
                .authorized_djs
                .iter()
                .copied()
                .filter(|u| *u != s.owning_dj)
                .collect();
            others.sort();
            others.insert(0, s.owning_dj);
            others
        };
        djs.dedup();
        djs.into_iter()
            .find_map(|dj| platform.voice_channel_of(self.guild_id, dj))
    }

    fn install_connection(&self, conn: Arc<dyn VoiceConnection>) -> Result<Arc<dyn VoiceConnection>, SessionError> {
        let previous = {
            let mut s = self.state.lock();
            if s.status == SessionStatus::Terminated {
                drop(s);
                conn.disconnect();
                return Err(SessionError::NotFound(self.channel_id));
            }
            conn.set_volume(s.volume);
            conn.set_equalizer(&s.equalizer);
            s.connection.replace(conn.clone())
        };
        if let Some(previous) = previous {
            previous.disconnect();
        }
        info!(
            "[{}] voice connection re-established in {}",
            self.channel_id,
            conn.channel_id()
        );
        Ok(conn)
    }

    /// Marks `track` as playing and announces it.
    pub(super) fn track_started(&self, track: Track) {
        let view = track.request.view();
        let Ok((replaces, snapshot)) = self.mutate(|s| {
            s.current = Some(track);
            s.status = SessionStatus::Playing;
            Ok((s.last_status_message, s.snapshot(self.guild_id, self.channel_id)))
        }) else {
            return;
        };

        info!("[{}] now playing `{}`", self.channel_id, view.title);
        let posted = self
            .deps
            .notifier
            .now_playing(self.guild_id, self.channel_id, &view, replaces);
        self.state.lock().last_status_message = posted;
        self.deps.notifier.presence(Some(&view));
        self.broadcast_state(snapshot);
    }

    /// Retires the current track: records it, re-queues it when looping,
    /// and drains the session when nothing is left.
    pub(super) fn track_finished(&self) {
        let listened = self.connection().map(|c| c.position()).unwrap_or_default();
        let Ok(finished) = self.mutate(|s| {
            let Some(track) = s.current.take() else {
                return Ok(None);
            };
            if s.loop_enabled {
                s.queue.push_back(track.request.clone());
            }
            s.push_history(track.request.clone());
            let drained = drain_if_exhausted(s);
            Ok(Some((
                track.request,
                drained.then(|| s.snapshot(self.guild_id, self.channel_id)),
            )))
        }) else {
            return;
        };

        let Some((request, drained)) = finished else {
            return;
        };

        self.deps.activity.record(ActivityEvent::TrackPlayed {
            guild_id: self.guild_id,
            requester: request.requester,
            title: request.title,
            listened,
        });
        if let Some(snapshot) = drained {
            self.announce_drained(snapshot);
        }
    }

    /// Puts a dequeued request back at the head of the queue.
    pub(super) fn requeue_front(&self, request: TrackRequest) {
        let _ = self.mutate(|s| {
            s.queue.push_front(request);
            Ok(())
        });
    }

    /// A dequeued request could not be played. Tells the channel and moves on.
    pub(super) fn track_failed(&self, request: &TrackRequest, reason: String) {
        warn!(
            "[{}] skipping `{}`: {}",
            self.channel_id, request.title, reason
        );
        let Ok((queue, drained)) = self.mutate(|s| {
            let drained = drain_if_exhausted(s);
            Ok((
                s.queue_views(),
                drained.then(|| s.snapshot(self.guild_id, self.channel_id)),
            ))
        }) else {
            return;
        };

        self.deps.notifier.notice(
            self.guild_id,
            self.channel_id,
            Notice::TrackSkipped {
                title: request.title.clone(),
                reason,
            },
        );
        match drained {
            Some(snapshot) => self.announce_drained(snapshot),
            None => self.broadcast_queue(queue),
        }
    }

    fn announce_drained(&self, snapshot: SessionSnapshot) {
        info!("[{}] queue finished", self.channel_id);
        self.deps
            .notifier
            .notice(self.guild_id, self.channel_id, Notice::QueueFinished);
        self.deps.notifier.presence(None);
        self.broadcast_state(snapshot);
    }
}

/// Switches to `Draining` when nothing is playing or pending. Returns `true`
/// only on the transition, so the notice goes out once per drain.
fn drain_if_exhausted(s: &mut SessionState) -> bool {
    if s.current.is_some() || s.has_pending() || s.status == SessionStatus::Draining {
        return false;
    }
    s.status = SessionStatus::Draining;
    true
}

/// Joins a channel with linear backoff, each attempt bounded by the connect
/// timeout.
async fn connect_with_retry(
    deps: &SessionDeps,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> Result<Arc<dyn VoiceConnection>, SessionError> {
    let config = &deps.config;
    let attempts = config.connect_attempts.max(1);
    let mut backoff = Backoff::linear(config.connect_backoff(), attempts - 1);

    loop {
        let attempt = tokio::time::timeout(
            config.connect_timeout(),
            deps.platform.connect(guild_id, channel_id),
        )
        .await;

        let failure = match attempt {
            Ok(Ok(conn)) => {
                info!("[{}] connected to voice channel {}", guild_id, channel_id);
                return Ok(conn);
            }
            Ok(Err(e)) => {
                warn!("[{}] voice connect to {} failed: {}", guild_id, channel_id, e);
                SessionError::ConnectFailure(e.to_string())
            }
            Err(_) => {
                warn!("[{}] voice connect to {} timed out", guild_id, channel_id);
                SessionError::ConnectTimeout { attempts }
            }
        };

        if backoff.is_exhausted() {
            return Err(failure);
        }
        tokio::time::sleep(backoff.next()).await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("status", &self.status())
            .finish()
    }
}

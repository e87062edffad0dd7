use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    common::{
        errors::SessionError,
        types::{ChannelId, GuildId, UserId},
    },
    configs::Config,
    gateway::{SubscriberHub, TokenStore},
    notify::{ActivityEvent, ActivitySink, Notice, Notifier, TerminationReason},
    player::{Departure, Session, SessionDeps},
    server::registry::{RegisterError, SessionRegistry},
    sources::TrackResolver,
    storage::PlaylistStore,
    voice::VoicePlatform,
};

/// Expired tokens are purged this often.
const TOKEN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// External services the engine talks to.
pub struct Collaborators {
    pub platform: Arc<dyn VoicePlatform>,
    pub resolver: Arc<dyn TrackResolver>,
    pub notifier: Arc<dyn Notifier>,
    pub activity: Arc<dyn ActivitySink>,
    pub playlists: Arc<dyn PlaylistStore>,
}

/// Top-level application state.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<SessionRegistry>,
    pub hub: Arc<SubscriberHub>,
    pub tokens: TokenStore,
    deps: SessionDeps,
}

impl AppState {
    pub fn new(config: Config, collaborators: Collaborators) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let hub = Arc::new(SubscriberHub::new());
        let deps = SessionDeps {
            config: Arc::new(config.player.clone()),
            platform: collaborators.platform,
            resolver: collaborators.resolver,
            notifier: collaborators.notifier,
            activity: collaborators.activity,
            playlists: collaborators.playlists,
            hub: hub.clone(),
            registry: registry.clone(),
        };

        Arc::new(Self {
            tokens: TokenStore::new(config.player.token_ttl()),
            config,
            registry,
            hub,
            deps,
        })
    }

    pub fn platform(&self) -> &Arc<dyn VoicePlatform> {
        &self.deps.platform
    }

    pub fn session(&self, channel_id: ChannelId) -> Option<Arc<Session>> {
        self.registry.get(channel_id)
    }

    /// Returns the session for the requester's voice channel, creating it
    /// when none exists. `channel_id` overrides the requester's channel.
    pub async fn join(
        &self,
        guild_id: GuildId,
        requester: UserId,
        channel_id: Option<ChannelId>,
    ) -> Result<Arc<Session>, SessionError> {
        let channel_id = channel_id
            .or_else(|| self.deps.platform.voice_channel_of(guild_id, requester))
            .or(self.config.player.default_voice_channel)
            .ok_or(SessionError::NoVoiceChannel)?;

        if let Some(existing) = self.registry.get(channel_id) {
            return Ok(existing);
        }

        let max = self.config.player.max_sessions_per_guild;
        if self.registry.count_in_guild(guild_id) >= max {
            return Err(SessionError::CapacityExceeded { guild: guild_id, max });
        }

        let session = Session::connect(self.deps.clone(), guild_id, channel_id, requester).await?;

        // The connect above awaited; another join may have landed meanwhile.
        match self.registry.register(session.clone(), max) {
            Ok(()) => {}
            Err(RegisterError::Occupied(existing)) => {
                debug!("[{}] lost join race, reusing existing session", channel_id);
                session.abandon();
                return Ok(existing);
            }
            Err(RegisterError::AtCapacity) => {
                session.abandon();
                return Err(SessionError::CapacityExceeded { guild: guild_id, max });
            }
        }

        info!("[{}] session created in {} by {}", guild_id, channel_id, requester);
        // The idle timeout runs inside the loop, so it must run even before
        // anything is queued.
        session.start_player_loop();
        self.deps
            .notifier
            .notice(guild_id, channel_id, Notice::Joined { dj: requester });
        self.deps.activity.record(ActivityEvent::DjAssigned {
            guild_id,
            user_id: requester,
        });
        Ok(session)
    }

    /// Voice state hook: `user_id` left `channel_id`.
    pub fn on_voice_leave(&self, channel_id: ChannelId, user_id: UserId) -> Option<Departure> {
        let session = self.registry.get(channel_id)?;
        Some(session.handle_departure(user_id))
    }

    /// Session for a native handshake. Falls back to any session in the
    /// guild when enabled and the channel has none.
    pub fn session_for_native(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<Arc<Session>> {
        if let Some(session) = self.registry.get(channel_id).filter(|s| s.guild_id == guild_id) {
            return Some(session);
        }
        if self.config.player.native_guild_fallback {
            return self.registry.find_in_guild(guild_id);
        }
        None
    }

    /// Issues a viewer token for a live session.
    pub fn issue_token(&self, user_id: UserId, channel_id: ChannelId) -> Result<String, SessionError> {
        if self.registry.get(channel_id).is_none() {
            return Err(SessionError::NotFound(channel_id));
        }
        Ok(self.tokens.issue(user_id, channel_id))
    }

    /// Issues a token and wraps it in a link to the control surface.
    pub fn overlay_url(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        view: Option<&str>,
    ) -> Result<String, SessionError> {
        let token = self.issue_token(user_id, channel_id)?;
        let mut url = format!(
            "{}/?token={}&session={}",
            self.config.server.public_base(),
            urlencoding::encode(&token),
            channel_id
        );
        if let Some(view) = view {
            url.push_str("&view=");
            url.push_str(&urlencoding::encode(view));
        }
        Ok(url)
    }

    pub fn spawn_token_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let state = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TOKEN_SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(state) = state.upgrade() else {
                    break;
                };
                let purged = state.tokens.purge_expired();
                if purged > 0 {
                    debug!("purged {} expired viewer tokens", purged);
                }
            }
        })
    }

    /// Ends every session. Used on process shutdown.
    pub fn shutdown(&self) {
        let sessions = self.registry.all();
        if !sessions.is_empty() {
            warn!("shutting down {} active sessions", sessions.len());
        }
        for session in sessions {
            session.terminate(TerminationReason::Stopped);
        }
    }
}

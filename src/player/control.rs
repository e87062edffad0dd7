//! Playback controls. Both the chat command handlers and the sync gateway
//! go through this one trait, so a command behaves the same wherever it
//! came from.

use async_trait::async_trait;
use tracing::debug;

use super::{
    equalizer::Equalizer,
    session::Session,
    state::{SessionSnapshot, SessionStatus},
    track::TrackRequest,
};
use crate::{
    common::{
        errors::{ResolveError, SessionError},
        types::UserId,
    },
    notify::TerminationReason,
    protocol::OutgoingMessage,
};

#[async_trait]
pub trait PlaybackControl: Send + Sync {
    /// With a query, resolves and queues it. Without one, resumes.
    async fn play(&self, query: Option<&str>, requester: UserId) -> Result<Option<TrackRequest>, SessionError>;

    async fn queue_add(&self, query: &str, requester: UserId) -> Result<TrackRequest, SessionError>;

    fn pause(&self) -> Result<(), SessionError>;

    fn resume(&self) -> Result<(), SessionError>;

    /// Ends the current track. The player loop picks the next one.
    fn skip(&self) -> Result<(), SessionError>;

    /// Ends the session.
    fn stop(&self) -> Result<(), SessionError>;

    /// Clamps to `0..=100` and returns the applied value.
    fn set_volume(&self, volume: f64) -> Result<u8, SessionError>;

    fn queue_remove(&self, index: usize) -> Result<TrackRequest, SessionError>;

    /// Moves the entry at `index` to the front and skips to it.
    fn queue_jump(&self, index: usize) -> Result<(), SessionError>;

    fn eq_preset(&self, preset: &str) -> Result<(), SessionError>;

    fn eq_update(&self, band: usize, gain_db: f32) -> Result<(), SessionError>;

    /// Returns the new shuffle flag.
    fn shuffle_toggle(&self) -> Result<bool, SessionError>;

    /// Returns the new loop flag.
    fn repeat_toggle(&self) -> Result<bool, SessionError>;

    fn promote_dj(&self, user_id: UserId) -> Result<(), SessionError>;

    fn snapshot(&self) -> SessionSnapshot;
}

#[async_trait]
impl PlaybackControl for Session {
    async fn play(&self, query: Option<&str>, requester: UserId) -> Result<Option<TrackRequest>, SessionError> {
        match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => self.queue_add(query, requester).await.map(Some),
            None => self.resume().map(|_| None),
        }
    }

    async fn queue_add(&self, query: &str, requester: UserId) -> Result<TrackRequest, SessionError> {
        if self.is_terminated() {
            return Err(SessionError::NotFound(self.channel_id));
        }

        let extraction_timeout = self.deps.config.extraction_timeout();
        let request = tokio::time::timeout(extraction_timeout, self.deps.resolver.resolve(query, requester))
            .await
            .map_err(|_| ResolveError::Timeout(extraction_timeout))??;

        self.enqueue(request.clone())?;
        Ok(request)
    }

    fn pause(&self) -> Result<(), SessionError> {
        let snapshot = self.mutate(|s| {
            if s.status != SessionStatus::Playing {
                return Err(SessionError::InvalidArgument("nothing is playing".to_string()));
            }
            if let Some(conn) = &s.connection {
                conn.pause();
            }
            s.status = SessionStatus::Paused;
            Ok(s.snapshot(self.guild_id, self.channel_id))
        })?;
        self.broadcast_state(snapshot);
        Ok(())
    }

    fn resume(&self) -> Result<(), SessionError> {
        let snapshot = self.mutate(|s| {
            if s.status != SessionStatus::Paused {
                return Err(SessionError::InvalidArgument("playback is not paused".to_string()));
            }
            if let Some(conn) = &s.connection {
                conn.resume();
            }
            s.status = SessionStatus::Playing;
            Ok(s.snapshot(self.guild_id, self.channel_id))
        })?;
        self.broadcast_state(snapshot);
        Ok(())
    }

    fn skip(&self) -> Result<(), SessionError> {
        self.mutate(|s| {
            let Some(track) = &s.current else {
                return Err(SessionError::InvalidArgument("nothing is playing".to_string()));
            };
            debug!("[{}] skipping `{}`", self.channel_id, track.title());
            if let Some(conn) = &s.connection {
                conn.stop();
            }
            Ok(())
        })
    }

    fn stop(&self) -> Result<(), SessionError> {
        if self.terminate(TerminationReason::Stopped) {
            Ok(())
        } else {
            Err(SessionError::NotFound(self.channel_id))
        }
    }

    fn set_volume(&self, volume: f64) -> Result<u8, SessionError> {
        if !volume.is_finite() {
            return Err(SessionError::InvalidArgument("volume must be a number".to_string()));
        }
        let volume = volume.round().clamp(0.0, 100.0) as u8;
        let snapshot = self.mutate(|s| {
            s.volume = volume;
            if let Some(conn) = &s.connection {
                conn.set_volume(volume);
            }
            Ok(s.snapshot(self.guild_id, self.channel_id))
        })?;
        self.broadcast_state(snapshot);
        Ok(volume)
    }

    fn queue_remove(&self, index: usize) -> Result<TrackRequest, SessionError> {
        let (removed, queue) = self.mutate(|s| {
            let removed = s
                .queue
                .remove(index)
                .ok_or_else(|| SessionError::InvalidArgument(format!("no queue entry at {}", index)))?;
            Ok((removed, s.queue_views()))
        })?;
        self.broadcast_queue(queue);
        Ok(removed)
    }

    fn queue_jump(&self, index: usize) -> Result<(), SessionError> {
        let queue = self.mutate(|s| {
            if s.jump_to(index).is_none() {
                return Err(SessionError::InvalidArgument(format!("no queue entry at {}", index)));
            }
            if s.current.is_some() {
                if let Some(conn) = &s.connection {
                    conn.stop();
                }
            }
            Ok(s.queue_views())
        })?;
        self.broadcast_queue(queue);
        self.wake.notify_one();
        Ok(())
    }

    fn eq_preset(&self, preset: &str) -> Result<(), SessionError> {
        let equalizer = Equalizer::from_preset(preset).ok_or_else(|| {
            let known: Vec<&str> = Equalizer::preset_names().collect();
            SessionError::InvalidArgument(format!(
                "unknown preset `{}`, expected one of: {}",
                preset,
                known.join(", ")
            ))
        })?;
        self.apply_equalizer(|eq| {
            *eq = equalizer;
            Ok(())
        })
    }

    fn eq_update(&self, band: usize, gain_db: f32) -> Result<(), SessionError> {
        self.apply_equalizer(|eq| {
            if eq.set_band(band, gain_db) {
                Ok(())
            } else {
                Err(SessionError::InvalidArgument(format!(
                    "invalid band {} or gain {}",
                    band, gain_db
                )))
            }
        })
    }

    fn shuffle_toggle(&self) -> Result<bool, SessionError> {
        let (enabled, snapshot) = self.mutate(|s| {
            s.shuffle_enabled = !s.shuffle_enabled;
            if s.shuffle_enabled {
                s.shuffle_queue();
            }
            Ok((s.shuffle_enabled, s.snapshot(self.guild_id, self.channel_id)))
        })?;
        self.broadcast_state(snapshot);
        Ok(enabled)
    }

    fn repeat_toggle(&self) -> Result<bool, SessionError> {
        let (enabled, snapshot) = self.mutate(|s| {
            s.loop_enabled = !s.loop_enabled;
            Ok((s.loop_enabled, s.snapshot(self.guild_id, self.channel_id)))
        })?;
        self.broadcast_state(snapshot);
        Ok(enabled)
    }

    fn promote_dj(&self, user_id: UserId) -> Result<(), SessionError> {
        Session::promote_dj(self, user_id)
    }

    fn snapshot(&self) -> SessionSnapshot {
        Session::snapshot(self)
    }
}

impl Session {
    fn apply_equalizer(
        &self,
        edit: impl FnOnce(&mut Equalizer) -> Result<(), SessionError>,
    ) -> Result<(), SessionError> {
        let equalizer = self.mutate(|s| {
            let mut next = s.equalizer.clone();
            edit(&mut next)?;
            if let Some(conn) = &s.connection {
                conn.set_equalizer(&next);
            }
            s.equalizer = next.clone();
            Ok(next)
        })?;
        self.deps
            .hub
            .broadcast(self.channel_id, &OutgoingMessage::EqChanged { equalizer });
        Ok(())
    }
}

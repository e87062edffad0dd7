use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    common::types::{ChannelId, GuildId},
    player::Session,
};

/// Why a freshly connected session could not be registered.
pub enum RegisterError {
    /// Another join for the same channel won the race.
    Occupied(Arc<Session>),
    AtCapacity,
}

/// Live sessions keyed by voice channel.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ChannelId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: ChannelId) -> Option<Arc<Session>> {
        self.sessions.get(&channel_id).map(|s| s.clone())
    }

    /// Registers `session` unless its channel is taken or the guild is at
    /// `max_per_guild`.
    pub fn register(&self, session: Arc<Session>, max_per_guild: usize) -> Result<(), RegisterError> {
        if let Some(existing) = self.get(session.channel_id) {
            return Err(RegisterError::Occupied(existing));
        }
        if self.count_in_guild(session.guild_id) >= max_per_guild {
            return Err(RegisterError::AtCapacity);
        }
        match self.sessions.entry(session.channel_id) {
            Entry::Occupied(e) => Err(RegisterError::Occupied(e.get().clone())),
            Entry::Vacant(e) => {
                e.insert(session);
                Ok(())
            }
        }
    }

    /// Removes `session`, but only if the registry still points at this
    /// exact instance.
    pub fn remove(&self, session: &Session) -> bool {
        self.sessions
            .remove_if(&session.channel_id, |_, s| std::ptr::eq(s.as_ref(), session))
            .is_some()
    }

    pub fn count_in_guild(&self, guild_id: GuildId) -> usize {
        self.sessions.iter().filter(|s| s.guild_id == guild_id).count()
    }

    /// Any session in `guild_id`, lowest channel id first.
    pub fn find_in_guild(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|s| s.guild_id == guild_id)
            .min_by_key(|s| s.channel_id)
            .map(|s| s.value().clone())
    }

    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

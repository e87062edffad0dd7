//! Playlist persistence. The engine only does key lookups and whole-array
//! writes; schema and pooling belong to the backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    common::{
        errors::StorageError,
        types::{GuildId, UserId},
    },
    player::track::TrackRequest,
};

pub mod memory;

pub use memory::MemoryPlaylistStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub playlist_id: String,
    pub name: String,
    pub creator_id: UserId,
    pub guild_id: GuildId,
    pub is_public: bool,
    pub track_data: Vec<StoredTrack>,
}

/// One element of a playlist's `track_data` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub duration: u64,
}

impl StoredTrack {
    pub fn into_request(self, requester: UserId) -> TrackRequest {
        TrackRequest {
            source_url: self.url,
            title: self.title,
            uploader: self.uploader,
            duration: Duration::from_secs(self.duration),
            requester,
        }
    }
}

impl From<&TrackRequest> for StoredTrack {
    fn from(r: &TrackRequest) -> Self {
        Self {
            url: r.source_url.clone(),
            title: r.title.clone(),
            uploader: r.uploader.clone(),
            duration: r.duration.as_secs(),
        }
    }
}

impl Playlist {
    /// Only the creator may read a private playlist.
    pub fn visible_to(&self, user_id: UserId) -> bool {
        self.is_public || self.creator_id == user_id
    }
}

#[async_trait]
pub trait PlaylistStore: Send + Sync {
    async fn fetch(&self, playlist_id: &str) -> Result<Option<Playlist>, StorageError>;

    async fn create(&self, playlist: Playlist) -> Result<(), StorageError>;

    /// Replaces the whole `track_data` array.
    async fn replace_tracks(&self, playlist_id: &str, tracks: Vec<StoredTrack>) -> Result<(), StorageError>;

    async fn append_tracks(&self, playlist_id: &str, tracks: Vec<StoredTrack>) -> Result<(), StorageError>;
}

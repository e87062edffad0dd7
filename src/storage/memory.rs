use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use super::{Playlist, PlaylistStore, StoredTrack};
use crate::common::errors::StorageError;

/// Keeps playlists in process memory.
#[derive(Default)]
pub struct MemoryPlaylistStore {
    playlists: DashMap<String, Playlist>,
}

impl MemoryPlaylistStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaylistStore for MemoryPlaylistStore {
    async fn fetch(&self, playlist_id: &str) -> Result<Option<Playlist>, StorageError> {
        Ok(self.playlists.get(playlist_id).map(|p| p.clone()))
    }

    async fn create(&self, playlist: Playlist) -> Result<(), StorageError> {
        match self.playlists.entry(playlist.playlist_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(playlist.playlist_id)),
            Entry::Vacant(slot) => {
                slot.insert(playlist);
                Ok(())
            }
        }
    }

    async fn replace_tracks(&self, playlist_id: &str, tracks: Vec<StoredTrack>) -> Result<(), StorageError> {
        let mut playlist = self
            .playlists
            .get_mut(playlist_id)
            .ok_or_else(|| StorageError::NotFound(playlist_id.to_string()))?;
        playlist.track_data = tracks;
        Ok(())
    }

    async fn append_tracks(&self, playlist_id: &str, tracks: Vec<StoredTrack>) -> Result<(), StorageError> {
        let mut playlist = self
            .playlists
            .get_mut(playlist_id)
            .ok_or_else(|| StorageError::NotFound(playlist_id.to_string()))?;
        playlist.track_data.extend(tracks);
        Ok(())
    }
}

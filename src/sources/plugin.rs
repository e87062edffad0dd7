use async_trait::async_trait;

use crate::{
    common::{errors::ResolveError, types::UserId},
    player::track::{Track, TrackRequest},
};

/// Turns user input into playable tracks.
///
/// Resolution happens in two steps so queueing stays cheap: `resolve` only
/// fetches metadata, `materialize` fetches a short-lived stream URL right
/// before playback.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves a URL or free-text search to the best matching track.
    async fn resolve(&self, query: &str, requester: UserId) -> Result<TrackRequest, ResolveError>;

    /// Produces a streamable track for a queued request.
    async fn materialize(&self, request: &TrackRequest) -> Result<Track, ResolveError>;
}

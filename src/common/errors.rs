use std::time::Duration;

use thiserror::Error;

use crate::common::types::{ChannelId, GuildId};

/// Failures surfaced by session lifecycle and control operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing connect/speak permission in channel {0}")]
    PermissionDenied(ChannelId),

    #[error("guild {guild} already runs {max} concurrent sessions")]
    CapacityExceeded { guild: GuildId, max: usize },

    #[error("voice connection timed out after {attempts} attempts")]
    ConnectTimeout { attempts: u32 },

    #[error("voice connection failed: {0}")]
    ConnectFailure(String),

    #[error("stale voice connection could not be re-established")]
    StaleConnection,

    #[error("requester is not in a voice channel and no default channel is configured")]
    NoVoiceChannel,

    #[error("no active session for channel {0}")]
    NotFound(ChannelId),

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Extraction(#[from] ResolveError),

    #[error(transparent)]
    Persistence(#[from] StorageError),
}

/// Failures from the track resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no results for `{0}`")]
    NoMatches(String),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("extractor exited with {status}: {stderr}")]
    ExtractorFailed { status: String, stderr: String },

    #[error("unexpected extractor output: {0}")]
    BadOutput(String),

    #[error("worker pool unavailable: {0}")]
    Pool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures from the voice platform.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("channel {0} does not exist")]
    UnknownChannel(ChannelId),

    #[error("voice handshake failed: {0}")]
    Handshake(String),

    #[error("connection is closed")]
    Disconnected,

    #[error("playback could not start: {0}")]
    Playback(String),
}

/// Why a viewer handshake was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,

    #[error("unknown token")]
    UnknownToken,

    #[error("token expired")]
    Expired,

    #[error("malformed handshake: {0}")]
    BadHandshake(String),
}

/// Failures from the playlist persistence collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("playlist `{0}` not found")]
    NotFound(String),

    #[error("playlist `{0}` already exists")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

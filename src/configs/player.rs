use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::types::ChannelId;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    /// How long a session may sit with an empty queue before leaving.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_sessions_per_guild")]
    pub max_sessions_per_guild: usize,
    /// Joined when the requester is not in a voice channel.
    #[serde(default)]
    pub default_voice_channel: Option<ChannelId>,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Linear backoff step between connect attempts.
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Total time the player loop may spend re-establishing a stale connection.
    #[serde(default = "default_reconnect_budget_secs")]
    pub reconnect_budget_secs: u64,
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,
    /// Completion poll period while a track plays.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Let a native handshake with no exact channel match bind to any
    /// session in the same guild.
    #[serde(default = "default_native_guild_fallback")]
    pub native_guild_fallback: bool,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            max_sessions_per_guild: default_max_sessions_per_guild(),
            default_voice_channel: None,
            connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_budget_secs: default_reconnect_budget_secs(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            history_size: default_history_size(),
            native_guild_fallback: default_native_guild_fallback(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

impl PlayerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    pub fn reconnect_budget(&self) -> Duration {
        Duration::from_secs(self.reconnect_budget_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

fn default_idle_timeout_secs() -> u64 {
    15 * 60
}

fn default_max_sessions_per_guild() -> usize {
    2
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_backoff_ms() -> u64 {
    1_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_reconnect_budget_secs() -> u64 {
    45
}

fn default_extraction_timeout_secs() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_history_size() -> usize {
    10
}

fn default_native_guild_fallback() -> bool {
    true
}

fn default_token_ttl_secs() -> u64 {
    10 * 60
}

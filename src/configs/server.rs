use serde::{Deserialize, Serialize};

use crate::common::types::UserId;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bound instead of `port` when that one is already taken.
    #[serde(default = "default_fallback_port")]
    pub fallback_port: u16,
    /// Base URL handed out in overlay links. Defaults to `http://host:port`.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    /// Only this user may run admin-scoped gateway commands.
    #[serde(default)]
    pub owner_id: Option<UserId>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            fallback_port: default_fallback_port(),
            public_url: None,
            static_dir: default_static_dir(),
            owner_id: None,
        }
    }
}

impl ServerConfig {
    pub fn public_base(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_fallback_port() -> u16 {
    8766
}

fn default_static_dir() -> String {
    "static".to_string()
}

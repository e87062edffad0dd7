use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{common::types::AnyResult, configs::*};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub player: PlayerConfig,
  #[serde(default)]
  pub resolver: ResolverConfig,
  pub logging: Option<LoggingConfig>,
}

impl Config {
  /// Reads `config.toml`, then `config.default.toml`, then falls back to
  /// built-in defaults when neither exists.
  pub fn load() -> AnyResult<Self> {
    let config_path = ["config.toml", "config.default.toml"]
      .into_iter()
      .find(|p| Path::new(p).exists());

    let Some(config_path) = config_path else {
      crate::log_println!("No config file found, using built-in defaults");
      return Ok(Self::default());
    };

    crate::log_println!("Loading configuration from: {}", config_path);

    let config_str = std::fs::read_to_string(config_path)?;
    if config_str.trim().is_empty() {
      return Err(format!("{} is empty", config_path).into());
    }

    Self::from_toml(&config_str)
  }

  pub fn from_toml(source: &str) -> AnyResult<Self> {
    let config: Config = toml::from_str(source)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> AnyResult<()> {
    if self.player.max_sessions_per_guild == 0 {
      return Err("player.max_sessions_per_guild must be at least 1".into());
    }
    if self.player.connect_attempts == 0 {
      return Err("player.connect_attempts must be at least 1".into());
    }
    if self.resolver.max_workers == 0 {
      return Err("resolver.max_workers must be at least 1".into());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_sections_use_defaults() {
    let config = Config::from_toml("[server]\nport = 9000\n").unwrap();
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.fallback_port, 8766);
    assert_eq!(config.player.idle_timeout_secs, 900);
    assert_eq!(config.player.connect_attempts, 3);
    assert!(config.player.native_guild_fallback);
    assert_eq!(config.player.token_ttl_secs, 600);
  }

  #[test]
  fn test_owner_and_default_channel_parse() {
    let config = Config::from_toml(
      "[server]\nowner_id = \"99\"\n[player]\ndefault_voice_channel = 1234\n",
    )
    .unwrap();
    assert_eq!(config.server.owner_id.map(|u| u.0), Some(99));
    assert_eq!(config.player.default_voice_channel.map(|c| c.0), Some(1234));
  }

  #[test]
  fn test_rejects_zero_capacity() {
    assert!(Config::from_toml("[player]\nmax_sessions_per_guild = 0\n").is_err());
  }
}

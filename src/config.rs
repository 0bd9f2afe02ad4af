//! Engine Configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! main_character = "jett"
//! storage_key = "mission_state"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_STORAGE_KEY: &str = "mission_state";

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

/// Configuration accepted by [`crate::MissionManager::initialize`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Actor credited when an event does not name one
    pub main_character: String,
    /// Key the snapshot is stored under
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            main_character: "player".to_string(),
            storage_key: default_storage_key(),
        }
    }
}

impl EngineConfig {
    pub fn new(main_character: impl Into<String>) -> Self {
        Self {
            main_character: main_character.into(),
            ..Self::default()
        }
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        if config.main_character.trim().is_empty() {
            return Err(ConfigError::EmptyMainCharacter);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

//! Bridge configuration — generated on first run, persisted as TOML.
//!
//! A fresh install gets a random localhost port and a random 32-byte token.
//! An extension that wants to talk to this bridge must ask the user for
//! both values; the token is the whole trust boundary, so it only ever
//! lives in the user's home directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors around config persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config encode error: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("Could not resolve the home directory")]
    NoHome,
}

/// Persisted bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Localhost port the bridge listens on.
    pub port: u16,
    /// Pre-shared secret extensions must present.
    pub token: String,
}

impl BridgeConfig {
    /// Generate fresh settings: a random dynamic-range port and a random
    /// 64-hex-char token.
    pub fn generate() -> Self {
        use rand::Rng;
        use rand::RngCore;

        let mut rng = rand::thread_rng();
        let port = rng.gen_range(49152..=65535);

        let mut token_bytes = [0u8; 32];
        rng.fill_bytes(&mut token_bytes);

        Self {
            port,
            token: hex::encode(token_bytes),
        }
    }

    /// Default config location: `~/.filament/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(".filament").join("config.toml"))
    }

    /// Load settings from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Write settings to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load existing settings, or generate and persist fresh ones.
    /// Returns the settings and whether they were just created.
    pub fn load_or_init(path: &Path) -> Result<(Self, bool), ConfigError> {
        if path.exists() {
            Ok((Self::load(path)?, false))
        } else {
            let config = Self::generate();
            config.save(path)?;
            Ok((config, true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_shape() {
        let config = BridgeConfig::generate();
        assert!(config.port >= 49152);
        assert_eq!(config.token.len(), 64); // 32 bytes = 64 hex chars
        assert!(config.token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_tokens_differ() {
        assert_ne!(BridgeConfig::generate().token, BridgeConfig::generate().token);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = BridgeConfig {
            port: 55001,
            token: "TESTTOKENTESTTOKEN".to_string(),
        };
        config.save(&path).unwrap();

        let loaded = BridgeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_init_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let (first, created) = BridgeConfig::load_or_init(&path).unwrap();
        assert!(created);

        let (second, created) = BridgeConfig::load_or_init(&path).unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(
            BridgeConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}

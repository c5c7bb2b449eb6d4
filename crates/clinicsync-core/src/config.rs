//! Application configuration management.
//!
//! This module handles loading and saving the console configuration, which
//! includes the backend API origin and the last used account name, and
//! resolves where the persisted mirror lives.
//!
//! Configuration is stored at `~/.config/clinicsync/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "clinicsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable that overrides the configured origin
pub const ORIGIN_ENV: &str = "CLINIC_API_ORIGIN";

/// Local dev proxy used by debug builds when nothing is configured
pub const DEV_ORIGIN: &str = "http://127.0.0.1:5173/api";

/// Production backend
pub const PRODUCTION_ORIGIN: &str = "https://api.clinic.example.com/api";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_origin: Option<String>,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// The backend origin: `CLINIC_API_ORIGIN`, then the config file, then
    /// the build's default.
    pub fn resolve_origin(&self) -> String {
        let from_env = std::env::var(ORIGIN_ENV).ok();
        let origin = pick_origin(from_env.as_deref(), self.api_origin.as_deref(), cfg!(debug_assertions));
        debug!(origin = %origin, "Resolved API origin");
        origin
    }

    /// Base directory for the per-origin mirrors.
    pub fn mirror_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Directory for the rolling log files.
    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.mirror_dir()?.join("logs"))
    }
}

fn pick_origin(from_env: Option<&str>, from_file: Option<&str>, debug_build: bool) -> String {
    let explicit = [from_env, from_file]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|origin| !origin.is_empty());

    match explicit {
        Some(origin) => origin.trim_end_matches('/').to_string(),
        None if debug_build => DEV_ORIGIN.to_string(),
        None => PRODUCTION_ORIGIN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_file() {
        let origin = pick_origin(Some("https://staging.test/api"), Some("https://file.test/api"), false);
        assert_eq!(origin, "https://staging.test/api");
    }

    #[test]
    fn test_file_used_when_env_blank() {
        let origin = pick_origin(Some("  "), Some("https://file.test/api/"), true);
        assert_eq!(origin, "https://file.test/api");
    }

    #[test]
    fn test_defaults_depend_on_build() {
        assert_eq!(pick_origin(None, None, true), DEV_ORIGIN);
        assert_eq!(pick_origin(None, None, false), PRODUCTION_ORIGIN);
    }

    #[test]
    fn test_config_json_shape() {
        let config: Config =
            serde_json::from_str(r#"{"api_origin":"https://x.test/api","last_username":"front-desk"}"#).unwrap();
        assert_eq!(config.api_origin.as_deref(), Some("https://x.test/api"));
        assert_eq!(config.last_username.as_deref(), Some("front-desk"));

        let empty: Config = serde_json::from_str("{}").unwrap();
        assert!(empty.api_origin.is_none());
    }
}

//! Local configuration and stored credentials
//!
//! Everything lives in `~/.r4r/config.toml`. The API key can also come from
//! `RENDER_API_KEY` or `--api-key`, both of which win over the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use r4r_api::{DEFAULT_BASE_URL, DEFAULT_STREAM_URL, ReconnectConfig};

const CONFIG_DIR: &str = ".r4r";
const CONFIG_FILE: &str = "config.toml";

/// Defaults for log retrieval and tailing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Records requested per history page
    pub page_size: u32,
    /// History window for `logs` when `--hours` is not given
    pub window_hours: i64,
    pub request_timeout_secs: u64,
    /// Interval between history polls once the live socket is gone
    pub poll_interval_secs: u64,
    /// Consecutive poll failures tolerated before the feed fails
    pub poll_attempts: u32,
    /// Records kept in the TUI viewer
    pub buffer_size: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            window_hours: 1,
            request_timeout_secs: 30,
            poll_interval_secs: 5,
            poll_attempts: 5,
            buffer_size: 10_000,
        }
    }
}

impl LogSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Backoff applied between failed polls
    pub fn backoff(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: self.poll_interval(),
            max_attempts: Some(self.poll_attempts.max(1)),
            ..ReconnectConfig::default()
        }
    }
}

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    /// Workspace that log queries are scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logs: LogSettings,
}

impl Config {
    /// `~/.r4r/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        Some(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path().context("Could not determine home directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

        // The file holds an API key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict {}", path.display()))?;
        }
        Ok(())
    }

    /// Forget stored credentials, keeping other settings
    ///
    /// Returns false when there was nothing to forget.
    pub fn clear_credentials(&mut self) -> bool {
        let had_key = self.api_key.is_some();
        self.api_key = None;
        self.owner_id = None;
        self.owner_name = None;
        self.email = None;
        self.login_time = None;
        had_key
    }

    /// Pick the API key: explicit override first, then the file
    pub fn api_key(&self, override_key: Option<&str>) -> Option<String> {
        override_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()))
            .map(str::to_string)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn stream_url(&self) -> &str {
        self.stream_url.as_deref().unwrap_or(DEFAULT_STREAM_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.logs.page_size, 100);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config {
            api_key: Some("rnd_abc".into()),
            owner_id: Some("own-1".into()),
            ..Default::default()
        };
        config.logs.poll_interval_secs = 9;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.logs.poll_interval(), Duration::from_secs(9));
    }

    #[test]
    fn test_partial_logs_section_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_key = \"k\"\n\n[logs]\npage_size = 250\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.logs.page_size, 250);
        assert_eq!(config.logs.window_hours, 1);
        assert_eq!(config.logs.poll_attempts, 5);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_key = [").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_override_key_wins() {
        let config = Config {
            api_key: Some("from-file".into()),
            ..Default::default()
        };
        assert_eq!(config.api_key(Some("from-env")).as_deref(), Some("from-env"));
        assert_eq!(config.api_key(Some("  ")).as_deref(), Some("from-file"));
        assert_eq!(config.api_key(None).as_deref(), Some("from-file"));
        assert_eq!(Config::default().api_key(None), None);
    }

    #[test]
    fn test_clear_credentials() {
        let mut config = Config {
            api_key: Some("k".into()),
            owner_name: Some("me".into()),
            base_url: Some("http://localhost/".into()),
            ..Default::default()
        };
        assert!(config.clear_credentials());
        assert!(config.api_key.is_none());
        assert!(config.owner_name.is_none());
        assert_eq!(config.base_url(), "http://localhost/");
        assert!(!config.clear_credentials());
    }

    #[test]
    fn test_backoff_uses_poll_settings() {
        let settings = LogSettings {
            poll_interval_secs: 2,
            poll_attempts: 3,
            ..Default::default()
        };
        let backoff = settings.backoff();
        assert_eq!(backoff.initial_delay, Duration::from_secs(2));
        assert_eq!(backoff.max_attempts, Some(3));
    }
}

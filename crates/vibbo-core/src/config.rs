//! Configuration management for the Vibbo bridge.
//!
//! Loads configuration from ${VIBBO_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the community portal. Override for tests/mirrors.
    pub base_url: Option<String>,
    /// Value of the x-version header the portal expects.
    pub version: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            version: Config::DEFAULT_API_VERSION.to_string(),
            timeout_secs: Config::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Feed polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Minutes between scheduled poll cycles. Values below the floor are
    /// clamped on read.
    pub scan_interval_minutes: u64,
    /// Maximum number of items requested per cycle.
    pub limit: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            scan_interval_minutes: Config::DEFAULT_SCAN_INTERVAL_MINUTES,
            limit: Config::DEFAULT_FEED_LIMIT,
        }
    }
}

/// Session refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Safety margin in seconds: a session expiring within this window is
    /// refreshed before use.
    pub refresh_margin_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: Config::DEFAULT_REFRESH_MARGIN_SECS,
        }
    }
}

/// Retry configuration for transient feed failures within one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for one fetch (first try included).
    pub max_attempts: u32,
    /// Base delay in seconds; doubles per attempt.
    pub base_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Config::DEFAULT_RETRY_ATTEMPTS,
            base_delay_secs: Config::DEFAULT_RETRY_BASE_SECS,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API settings.
    pub api: ApiConfig,

    /// Feed polling settings.
    pub feed: FeedConfig,

    /// Session refresh settings.
    pub session: SessionConfig,

    /// Retry/backoff settings.
    pub retry: RetryConfig,
}

impl Config {
    const DEFAULT_API_VERSION: &str = "577";
    const DEFAULT_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 30;
    /// The portal's options flow never allowed intervals below 5 minutes.
    const MIN_SCAN_INTERVAL_MINUTES: u64 = 5;
    const DEFAULT_FEED_LIMIT: u32 = 10;
    const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;
    const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
    const DEFAULT_RETRY_BASE_SECS: u64 = 2;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Scheduled poll interval with the floor applied.
    pub fn scan_interval(&self) -> Duration {
        let minutes = self
            .feed
            .scan_interval_minutes
            .max(Self::MIN_SCAN_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Session refresh safety margin.
    pub fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session.refresh_margin_secs as i64)
    }

    /// Initializes a config file with the default template.
    ///
    /// # Errors
    /// Fails if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("config already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Saves only the scan interval to the config file.
    ///
    /// Creates the file if it doesn't exist.
    /// Preserves existing fields and comments using toml_edit.
    pub fn save_scan_interval(minutes: u64) -> Result<()> {
        Self::save_scan_interval_to(&paths::config_path(), minutes)
    }

    /// Saves only the scan interval to a specific config file path.
    ///
    /// Creates the file with the default template if it doesn't exist.
    /// If the file exists, merges user values into the latest template.
    pub fn save_scan_interval_to(path: &Path, minutes: u64) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        if minutes < Self::MIN_SCAN_INTERVAL_MINUTES {
            bail!(
                "scan interval must be at least {} minutes",
                Self::MIN_SCAN_INTERVAL_MINUTES
            );
        }

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["feed"]["scan_interval_minutes"] = value(minutes as i64);

        Self::write_config(path, &doc.to_string())
    }

    fn write_config(path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
/// To update, edit default_config.toml directly.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// This ensures new comments/sections from the template are always present,
/// while preserving user's customized values.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for Vibbo bridge configuration and data directories.
    //!
    //! VIBBO_HOME resolution order:
    //! 1. VIBBO_HOME environment variable (if set)
    //! 2. ~/.config/vibbo (default)

    use std::path::PathBuf;

    /// Returns the Vibbo bridge home directory.
    ///
    /// Checks VIBBO_HOME env var first, falls back to ~/.config/vibbo
    pub fn vibbo_home() -> PathBuf {
        if let Ok(home) = std::env::var("VIBBO_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("vibbo"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        vibbo_home().join("config.toml")
    }

    /// Returns the path to the sessions.json store.
    pub fn sessions_path() -> PathBuf {
        vibbo_home().join("sessions.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.feed.scan_interval_minutes, 30);
        assert_eq!(config.feed.limit, 10);
        assert_eq!(config.session.refresh_margin_secs, 60);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.api.version, "577");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_scan_interval_floor() {
        let mut config = Config::default();
        config.feed.scan_interval_minutes = 1;
        assert_eq!(config.scan_interval(), Duration::from_secs(5 * 60));

        config.feed.scan_interval_minutes = 45;
        assert_eq!(config.scan_interval(), Duration::from_secs(45 * 60));
    }

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[feed]\nscan_interval_minutes = 15\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.feed.scan_interval_minutes, 15);
        // untouched sections keep their defaults
        assert_eq!(config.feed.limit, 10);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.feed.scan_interval_minutes, 30);
    }

    #[test]
    fn test_save_scan_interval_preserves_user_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\ntimeout_secs = 20\n").unwrap();

        Config::save_scan_interval_to(&path, 10).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.feed.scan_interval_minutes, 10);
        assert_eq!(config.api.timeout_secs, 20);
    }

    #[test]
    fn test_save_scan_interval_rejects_below_floor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(Config::save_scan_interval_to(&path, 2).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(config.feed.scan_interval_minutes, 30);
        assert_eq!(config.api.timeout_secs, 10);
    }
}

//! Configuration management for Reelcast

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ReelcastError, Result};

pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.facebook.com/v18.0";
pub const DEFAULT_CLOUDINARY_API_URL: &str = "https://api.cloudinary.com/v1_1";
pub const DEFAULT_CLOUDINARY_FOLDER: &str = "instagram-reels-scheduled";
pub const DEFAULT_CLOUDINARY_SECRET_ENV: &str = "CLOUDINARY_API_SECRET";
pub const INSTAGRAM_TOKEN_ENV: &str = "REELCAST_INSTAGRAM_TOKEN";

/// One week
pub const MAX_CHECK_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub cloudinary: Option<CloudinaryConfig>,
    pub instagram: Option<InstagramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub check_interval_minutes: u64,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 1,
            poll_interval_secs: 5,
            max_poll_attempts: 30,
        }
    }
}

impl SchedulerConfig {
    /// The check interval as a duration
    ///
    /// Zero passes through; starting the loop rejects it.
    pub fn check_interval(&self) -> Result<Duration> {
        if self.check_interval_minutes > MAX_CHECK_INTERVAL_MINUTES {
            return Err(ReelcastError::InvalidInput(format!(
                "Check interval must be at most {} minutes",
                MAX_CHECK_INTERVAL_MINUTES
            )));
        }
        Ok(Duration::from_secs(self.check_interval_minutes * 60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    /// Inline secret; prefer `api_secret_env`
    pub api_secret: Option<String>,
    /// Name of the environment variable holding the secret
    pub api_secret_env: Option<String>,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_cloudinary_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub account_id: String,
    pub access_token_file: Option<String>,
    #[serde(default = "default_graph_api_url")]
    pub graph_api_url: String,
}

fn default_folder() -> String {
    DEFAULT_CLOUDINARY_FOLDER.to_string()
}

fn default_cloudinary_api_url() -> String {
    DEFAULT_CLOUDINARY_API_URL.to_string()
}

fn default_graph_api_url() -> String {
    DEFAULT_GRAPH_API_URL.to_string()
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the default location yields the default config;
    /// a missing file named by `REELCAST_CONFIG` is an error.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;

        let mut config = if std::env::var("REELCAST_CONFIG").is_err() && !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default_config()
        } else {
            Self::load_from_path(&config_path)?
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/reelcast/posts.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            cloudinary: None,
            instagram: None,
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("REELCAST_DB_PATH") {
            self.database.path = path;
        }
    }

    /// Database path with `~` expanded
    pub fn database_path(&self) -> String {
        expand_path(&self.database.path)
    }

    pub fn cloudinary(&self) -> Result<&CloudinaryConfig> {
        self.cloudinary
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField("cloudinary".to_string()).into())
    }

    pub fn instagram(&self) -> Result<&InstagramConfig> {
        self.instagram
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField("instagram".to_string()).into())
    }
}

impl CloudinaryConfig {
    /// Resolve the API secret: inline value first, then the environment
    pub fn api_secret(&self) -> Result<SecretString> {
        if let Some(secret) = self.api_secret.as_ref().filter(|s| !s.is_empty()) {
            return Ok(SecretString::from(secret.clone()));
        }

        let env_name = self
            .api_secret_env
            .as_deref()
            .unwrap_or(DEFAULT_CLOUDINARY_SECRET_ENV);

        match std::env::var(env_name) {
            Ok(secret) if !secret.is_empty() => Ok(SecretString::from(secret)),
            _ => Err(ConfigError::MissingField(format!(
                "cloudinary.api_secret (or environment variable {})",
                env_name
            ))
            .into()),
        }
    }
}

impl InstagramConfig {
    /// Resolve the access token: environment first, then the token file
    pub fn access_token(&self) -> Result<SecretString> {
        if let Ok(token) = std::env::var(INSTAGRAM_TOKEN_ENV) {
            if !token.trim().is_empty() {
                return Ok(SecretString::from(token.trim().to_string()));
            }
        }

        let file = self.access_token_file.as_ref().ok_or_else(|| {
            ConfigError::MissingField(format!(
                "instagram.access_token_file (or environment variable {})",
                INSTAGRAM_TOKEN_ENV
            ))
        })?;

        let path = expand_path(file);
        let token = std::fs::read_to_string(&path).map_err(ConfigError::ReadError)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigError::MissingField(format!("access token in {}", path)).into());
        }

        Ok(SecretString::from(token.to_string()))
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).to_string()
}

/// Resolve the configuration file path following the XDG layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("REELCAST_CONFIG") {
        return Ok(PathBuf::from(expand_path(&path)));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("reelcast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const FULL_CONFIG: &str = r#"
[database]
path = "/tmp/reelcast-test/posts.db"

[scheduler]
check_interval_minutes = 2
poll_interval_secs = 3
max_poll_attempts = 10

[cloudinary]
cloud_name = "demo"
api_key = "123"
api_secret = "shh"

[instagram]
account_id = "17841400000000000"
access_token_file = "/tmp/does-not-matter.token"
"#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(FULL_CONFIG);
        let config = Config::load_from_path(file.path()).unwrap();

        assert_eq!(config.database.path, "/tmp/reelcast-test/posts.db");
        assert_eq!(
            config.scheduler,
            SchedulerConfig {
                check_interval_minutes: 2,
                poll_interval_secs: 3,
                max_poll_attempts: 10,
            }
        );

        let cloudinary = config.cloudinary().unwrap();
        assert_eq!(cloudinary.cloud_name, "demo");
        assert_eq!(cloudinary.folder, DEFAULT_CLOUDINARY_FOLDER);
        assert_eq!(cloudinary.api_url, DEFAULT_CLOUDINARY_API_URL);

        let instagram = config.instagram().unwrap();
        assert_eq!(instagram.account_id, "17841400000000000");
        assert_eq!(instagram.graph_api_url, DEFAULT_GRAPH_API_URL);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config("[database]\npath = \"/tmp/x.db\"\n");
        let config = Config::load_from_path(file.path()).unwrap();

        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert!(config.cloudinary.is_none());
        assert!(matches!(
            config.instagram(),
            Err(ReelcastError::Config(ConfigError::MissingField(_)))
        ));
    }

    #[test]
    fn test_partial_scheduler_section() {
        let file = write_config(
            "[database]\npath = \"/tmp/x.db\"\n[scheduler]\nmax_poll_attempts = 5\n",
        );
        let config = Config::load_from_path(file.path()).unwrap();

        assert_eq!(config.scheduler.max_poll_attempts, 5);
        assert_eq!(config.scheduler.poll_interval_secs, 5);
        assert_eq!(config.scheduler.check_interval_minutes, 1);
    }

    #[test]
    fn test_check_interval_bounds() {
        let mut scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.check_interval().unwrap(), Duration::from_secs(60));

        scheduler.check_interval_minutes = MAX_CHECK_INTERVAL_MINUTES;
        assert_eq!(
            scheduler.check_interval().unwrap(),
            Duration::from_secs(7 * 24 * 3600)
        );

        scheduler.check_interval_minutes = u64::MAX;
        assert!(matches!(
            scheduler.check_interval(),
            Err(ReelcastError::InvalidInput(msg)) if msg.contains("at most 10080 minutes")
        ));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let file = write_config("[database\npath = ");
        assert!(matches!(
            Config::load_from_path(file.path()),
            Err(ReelcastError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::load_from_path(Path::new("/nonexistent/reelcast/config.toml"));
        assert!(matches!(
            result,
            Err(ReelcastError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    fn test_database_path_expands_tilde() {
        let config = Config::default_config();
        assert!(!config.database_path().starts_with('~'));
        assert!(config.database_path().ends_with("reelcast/posts.db"));
    }

    #[test]
    #[serial]
    fn test_load_honours_env_overrides() {
        let file = write_config(FULL_CONFIG);
        std::env::set_var("REELCAST_CONFIG", file.path());
        std::env::set_var("REELCAST_DB_PATH", "/tmp/override.db");

        let config = Config::load().unwrap();

        std::env::remove_var("REELCAST_CONFIG");
        std::env::remove_var("REELCAST_DB_PATH");

        assert_eq!(config.database.path, "/tmp/override.db");
        assert_eq!(config.scheduler.check_interval_minutes, 2);
    }

    #[test]
    #[serial]
    fn test_explicit_missing_config_is_error() {
        std::env::set_var("REELCAST_CONFIG", "/nonexistent/reelcast.toml");
        let result = Config::load();
        std::env::remove_var("REELCAST_CONFIG");

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_cloudinary_secret_resolution() {
        let mut cloudinary = CloudinaryConfig {
            cloud_name: "demo".to_string(),
            api_key: "123".to_string(),
            api_secret: None,
            api_secret_env: Some("REELCAST_TEST_CLOUDINARY_SECRET".to_string()),
            folder: default_folder(),
            api_url: default_cloudinary_api_url(),
        };

        std::env::remove_var("REELCAST_TEST_CLOUDINARY_SECRET");
        assert!(cloudinary.api_secret().is_err());

        std::env::set_var("REELCAST_TEST_CLOUDINARY_SECRET", "from-env");
        assert_eq!(cloudinary.api_secret().unwrap().expose_secret(), "from-env");
        std::env::remove_var("REELCAST_TEST_CLOUDINARY_SECRET");

        cloudinary.api_secret = Some("inline".to_string());
        assert_eq!(cloudinary.api_secret().unwrap().expose_secret(), "inline");
    }

    #[test]
    #[serial]
    fn test_instagram_token_from_file_and_env() {
        let temp_dir = TempDir::new().unwrap();
        let token_path = temp_dir.path().join("instagram.token");
        std::fs::write(&token_path, "  file-token\n").unwrap();

        let instagram = InstagramConfig {
            account_id: "1".to_string(),
            access_token_file: Some(token_path.to_string_lossy().to_string()),
            graph_api_url: default_graph_api_url(),
        };

        std::env::remove_var(INSTAGRAM_TOKEN_ENV);
        assert_eq!(instagram.access_token().unwrap().expose_secret(), "file-token");

        std::env::set_var(INSTAGRAM_TOKEN_ENV, "env-token");
        assert_eq!(instagram.access_token().unwrap().expose_secret(), "env-token");
        std::env::remove_var(INSTAGRAM_TOKEN_ENV);
    }

    #[test]
    #[serial]
    fn test_instagram_token_missing() {
        std::env::remove_var(INSTAGRAM_TOKEN_ENV);
        let instagram = InstagramConfig {
            account_id: "1".to_string(),
            access_token_file: None,
            graph_api_url: default_graph_api_url(),
        };

        let err = instagram.access_token().unwrap_err();
        assert!(err.to_string().contains(INSTAGRAM_TOKEN_ENV));
    }
}

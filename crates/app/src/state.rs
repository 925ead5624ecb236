use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use common::identity::DRIVE_APPDATA_SCOPE;
use common::reconcile::DuplicatePolicy;
use common::remote::{RemoteLocation, DEFAULT_CONTAINER, DEFAULT_SNAPSHOT_NAME, GOOGLE_API_URL};
use serde::{Deserialize, Serialize};
use url::Url;

pub const APP_NAME: &str = "vaultsync";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// OAuth client id registered with the identity provider. Assertions
    /// whose `aud` names another client are refused.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Scope requested for storage grants
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_drive_url")]
    pub drive_api_url: Url,
    #[serde(default = "default_drive_url")]
    pub drive_upload_url: Url,
    #[serde(default = "default_snapshot_name")]
    pub snapshot_name: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Delay between identity provider readiness polls
    #[serde(default = "default_identity_retry_ms")]
    pub identity_retry_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for log files (stderr only if not set)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_scope() -> String {
    DRIVE_APPDATA_SCOPE.to_string()
}

fn default_drive_url() -> Url {
    Url::parse(GOOGLE_API_URL).expect("hardcoded URL must parse")
}

fn default_snapshot_name() -> String {
    DEFAULT_SNAPSHOT_NAME.to_string()
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

fn default_identity_retry_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            scope: default_scope(),
            drive_api_url: default_drive_url(),
            drive_upload_url: default_drive_url(),
            snapshot_name: default_snapshot_name(),
            container: default_container(),
            duplicate_policy: DuplicatePolicy::default(),
            identity_retry_ms: default_identity_retry_ms(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn location(&self) -> RemoteLocation {
        RemoteLocation {
            name: self.snapshot_name.clone(),
            container: self.container.clone(),
        }
    }

    pub fn identity_retry_delay(&self) -> Duration {
        Duration::from_millis(self.identity_retry_ms)
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.vaultsync)
    pub app_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.vaultsync)
    pub fn app_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;
        if app_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        config.log_level()?;

        fs::create_dir_all(&app_dir)?;
        let config_path = app_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        Ok(Self {
            app_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;
        let config_path = app_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        config.log_level()?;

        Ok(Self {
            app_dir,
            config_path,
            config,
        })
    }

    /// Like [`AppState::load`], but falls back to defaults when nothing has
    /// been initialized. Commands that only need crypto work without `init`.
    pub fn load_or_default(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        match Self::load(custom_path.clone()) {
            Err(StateError::NotInitialized) => {
                let app_dir = Self::app_dir(custom_path)?;
                Ok(Self {
                    config_path: app_dir.join(CONFIG_FILE_NAME),
                    app_dir,
                    config: AppConfig::default(),
                })
            }
            other => other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("vaultsync directory not initialized. Run 'vaultsync init' first")]
    NotInitialized,

    #[error("vaultsync directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

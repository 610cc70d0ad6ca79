use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BRIDGE_URL: &str = "http://localhost:5349";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const APP_DIR_NAME: &str = "fiscal-console";

pub const ENV_CONFIG_PATH: &str = "FISCAL_CONSOLE_CONFIG";
pub const ENV_BRIDGE_URL: &str = "FISCAL_BRIDGE_URL";
pub const ENV_POLL_INTERVAL: &str = "FISCAL_POLL_INTERVAL_SECS";
pub const ENV_STATE_DIR: &str = "FISCAL_STATE_DIR";
pub const ENV_REQUEST_TIMEOUT: &str = "FISCAL_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("bridge url must start with http:// or https://: {0}")]
    InvalidUrl(String),
    #[error("poll interval must be at least 1 second")]
    InvalidInterval,
}

/// Resolved console configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    pub base_url: String,
    pub poll_interval: Duration,
    pub state_dir: PathBuf,
    pub request_timeout: Option<Duration>,
}

/// One configuration layer. Later layers win field by field.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsLayer {
    pub bridge_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub state_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

impl SettingsLayer {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Ok(Self {
            bridge_url: read(ENV_BRIDGE_URL),
            poll_interval_secs: read(ENV_POLL_INTERVAL)
                .map(|value| parse_secs(ENV_POLL_INTERVAL, &value))
                .transpose()?,
            state_dir: read(ENV_STATE_DIR).map(PathBuf::from),
            request_timeout_secs: read(ENV_REQUEST_TIMEOUT)
                .map(|value| parse_secs(ENV_REQUEST_TIMEOUT, &value))
                .transpose()?,
        })
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn merge(self, over: SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            bridge_url: over.bridge_url.or(self.bridge_url),
            poll_interval_secs: over.poll_interval_secs.or(self.poll_interval_secs),
            state_dir: over.state_dir.or(self.state_dir),
            request_timeout_secs: over.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<u64, SettingsError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| SettingsError::InvalidEnv {
            key,
            value: value.to_string(),
        })
}

impl ConsoleSettings {
    /// defaults < settings file < environment < command line
    pub fn resolve(cli: SettingsLayer) -> Result<Self, SettingsError> {
        let file = load_settings_file(&settings_file_path())?;
        let env = SettingsLayer::from_env()?;
        Self::from_layers([file, env, cli])
    }

    pub fn from_layers<I>(layers: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = SettingsLayer>,
    {
        let merged = layers
            .into_iter()
            .fold(SettingsLayer::default(), SettingsLayer::merge);

        let base_url = merged
            .bridge_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BRIDGE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SettingsError::InvalidUrl(base_url));
        }
        let poll_secs = merged.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_secs == 0 {
            return Err(SettingsError::InvalidInterval);
        }
        Ok(Self {
            base_url,
            poll_interval: Duration::from_secs(poll_secs),
            state_dir: merged.state_dir.unwrap_or_else(default_state_dir),
            request_timeout: merged
                .request_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("console.log")
    }
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BRIDGE_URL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            state_dir: default_state_dir(),
            request_timeout: None,
        }
    }
}

/// Missing file is an empty layer.
pub fn load_settings_file(path: &Path) -> Result<SettingsLayer, SettingsError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SettingsLayer::default()),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&contents).map_err(|err| SettingsError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

pub fn settings_file_path() -> PathBuf {
    if let Ok(value) = std::env::var(ENV_CONFIG_PATH) {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return PathBuf::from(value).join(APP_DIR_NAME).join("config.toml");
        }
    }
    if let Ok(value) = std::env::var("HOME") {
        return PathBuf::from(value)
            .join(".config")
            .join(APP_DIR_NAME)
            .join("config.toml");
    }
    PathBuf::from(".fiscal-console/config.toml")
}

pub fn default_state_dir() -> PathBuf {
    if let Ok(value) = std::env::var("XDG_STATE_HOME") {
        if !value.trim().is_empty() {
            return PathBuf::from(value).join(APP_DIR_NAME);
        }
    }
    if let Ok(value) = std::env::var("HOME") {
        return PathBuf::from(value)
            .join(".local")
            .join("state")
            .join(APP_DIR_NAME);
    }
    PathBuf::from(".fiscal-console/state")
}

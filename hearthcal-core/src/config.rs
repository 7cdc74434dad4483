//! Configuration at ~/.config/hearthcal/config.toml, overridable with
//! `HEARTHCAL_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};
use crate::remote::DEFAULT_PROXY_URL;

const DEFAULT_SYNC_INTERVAL: &str = "5m";
const DEFAULT_REQUEST_TIMEOUT: &str = "30s";
const DEFAULT_TIMEZONE: &str = "UTC";
const DATABASE_FILE: &str = "hearthcal.json";

fn default_proxy_url() -> String {
    DEFAULT_PROXY_URL.to_string()
}

fn default_sync_interval() -> String {
    DEFAULT_SYNC_INTERVAL.to_string()
}

fn default_request_timeout() -> String {
    DEFAULT_REQUEST_TIMEOUT.to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HearthcalConfig {
    /// CORS relay that feeds are fetched through
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,

    #[serde(default = "default_sync_interval")]
    pub sync_interval: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Zone for floating times and all-day dates in feeds
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Defaults to the platform data directory
    pub data_dir: Option<PathBuf>,
}

impl Default for HearthcalConfig {
    fn default() -> Self {
        HearthcalConfig {
            proxy_url: default_proxy_url(),
            sync_interval: default_sync_interval(),
            request_timeout: default_request_timeout(),
            timezone: default_timezone(),
            data_dir: None,
        }
    }
}

impl HearthcalConfig {
    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| {
                SyncError::Configuration("Could not determine config directory".into())
            })?
            .join("hearthcal");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the user's config, writing a commented default file on first run.
    pub fn load() -> SyncResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load from `path` (which may be missing) layered with the environment.
    pub fn load_from(path: &Path) -> SyncResult<Self> {
        let config: HearthcalConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("HEARTHCAL"))
            .build()
            .map_err(|e| SyncError::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Fail early on values that would only blow up later.
    fn validate(&self) -> SyncResult<()> {
        self.sync_interval()?;
        self.request_timeout()?;
        self.timezone()?;
        url::Url::parse(&self.proxy_url).map_err(|e| {
            SyncError::Configuration(format!("Invalid proxy_url '{}': {}", self.proxy_url, e))
        })?;
        Ok(())
    }

    pub fn sync_interval(&self) -> SyncResult<Duration> {
        parse_duration("sync_interval", &self.sync_interval)
    }

    pub fn request_timeout(&self) -> SyncResult<Duration> {
        parse_duration("request_timeout", &self.request_timeout)
    }

    pub fn timezone(&self) -> SyncResult<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            SyncError::Configuration(format!("Unknown timezone '{}'", self.timezone))
        })
    }

    /// Directory holding the event store, with `~` expanded.
    pub fn data_path(&self) -> SyncResult<PathBuf> {
        match &self.data_dir {
            Some(dir) => {
                let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
                Ok(PathBuf::from(expanded))
            }
            None => dirs::data_dir()
                .map(|dir| dir.join("hearthcal"))
                .ok_or_else(|| {
                    SyncError::Configuration("Could not determine data directory".into())
                }),
        }
    }

    pub fn database_path(&self) -> SyncResult<PathBuf> {
        Ok(self.data_path()?.join(DATABASE_FILE))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> SyncResult<()> {
        let contents = format!(
            "\
# hearthcal configuration

# CORS relay used to fetch subscribed calendars:
# proxy_url = \"{}\"

# How often subscriptions are refreshed:
# sync_interval = \"{}\"

# Give up on a feed after:
# request_timeout = \"{}\"

# Timezone for events without one (IANA name):
# timezone = \"{}\"

# Where the event store is kept:
# data_dir = \"~/.local/share/hearthcal\"
",
            DEFAULT_PROXY_URL, DEFAULT_SYNC_INTERVAL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TIMEZONE
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Configuration(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SyncError::Configuration(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

fn parse_duration(key: &str, value: &str) -> SyncResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| SyncError::Configuration(format!("Invalid {} '{}': {}", key, value, e)))
}

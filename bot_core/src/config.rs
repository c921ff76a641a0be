//! Runtime configuration for the village bot.
//!
//! Loaded once at startup from a JSON file and then passed by reference to
//! every component. Secrets may be overridden through environment variables so
//! they do not have to live in the file.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use lettre::address::AddressError;
use lettre::message::Mailbox;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const CONFIG_PATH_ENV: &str = "VILLAGE_BOT_CONFIG_PATH";
pub const PASSWORD_ENV: &str = "VILLAGE_BOT_PASSWORD";
pub const MAIL_PASSWORD_ENV: &str = "VILLAGE_BOT_MAIL_PASSWORD";
pub const DEFAULT_CONFIG_FILE: &str = "village_bot.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub poll_interval_seconds: u64,
    /// Reserved. Read and reported, never acted on.
    pub auto_evade_attack: bool,
    pub debug_mode: bool,
    pub mail_from: Option<String>,
    pub mail_password: Option<String>,
    pub mail_to: Option<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub job_plan_path: PathBuf,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    pub max_cycles: Option<u64>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            password: String::new(),
            poll_interval_seconds: 300,
            auto_evade_attack: false,
            debug_mode: false,
            mail_from: None,
            mail_password: None,
            mail_to: None,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            job_plan_path: PathBuf::from("build_jobs.csv"),
            user_agent: "Firefox".to_string(),
            request_timeout_seconds: 30,
            max_cycles: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse bot config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read bot config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("missing required setting '{0}'")]
    Missing(&'static str),
    #[error("invalid server_url '{value}': {source}")]
    InvalidServerUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("poll_interval_seconds must be greater than zero")]
    ZeroPollInterval,
    #[error("invalid {field} '{value}': {source}")]
    InvalidMailAddress {
        field: &'static str,
        value: String,
        #[source]
        source: AddressError,
    },
}

/// Mail settings, present only when every field needed to send is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings<'a> {
    pub from: &'a str,
    pub password: &'a str,
    pub to: &'a str,
}

impl BotConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        BotConfig::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Missing("server_url"));
        }
        self.base_url()?;
        if self.username.trim().is_empty() {
            return Err(ConfigError::Missing("username"));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        check_mailbox("mail_from", self.mail_from.as_deref())?;
        check_mailbox("mail_to", self.mail_to.as_deref())?;
        Ok(())
    }

    /// Server root every relative page path is joined onto.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let trimmed = self.server_url.trim();
        // `Url::join` drops the last path segment unless it ends with '/'.
        let normalised = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        Url::parse(&normalised).map_err(|source| ConfigError::InvalidServerUrl {
            value: self.server_url.clone(),
            source,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn mail_settings(&self) -> Option<MailSettings<'_>> {
        let from = non_empty(self.mail_from.as_deref())?;
        let password = non_empty(self.mail_password.as_deref())?;
        let to = non_empty(self.mail_to.as_deref())?;
        Some(MailSettings { from, password, to })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = env::var(PASSWORD_ENV) {
            self.password = password;
        }
        if let Ok(password) = env::var(MAIL_PASSWORD_ENV) {
            self.mail_password = Some(password);
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_mailbox(field: &'static str, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(address) = non_empty(value) else {
        return Ok(());
    };
    address
        .trim()
        .parse::<Mailbox>()
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidMailAddress {
            field,
            value: address.to_string(),
            source,
        })
}

/// Resolve the config path (explicit flag, then env var, then the default
/// file name), load it, and apply secret overrides from the environment.
pub fn load_bot_config(explicit: Option<&Path>) -> Result<(BotConfig, PathBuf), ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
    };

    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFailed {
        path: path.clone(),
        source,
    })?;
    let mut config: BotConfig = serde_json::from_str(&contents)?;
    config.apply_env_overrides();
    config.validate()?;

    Ok((config, path))
}

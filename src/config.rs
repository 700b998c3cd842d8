use thiserror::Error;
use url::Url;

use std::env;
use std::path::PathBuf;

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings read once at startup and handed to the client and stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Site root, e.g. `https://lms.example.org`. Must be https.
    pub base_url: Url,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    pub page_size: u32,
    /// Where saved filters and the locale live.
    pub prefs_path: Option<PathBuf>,
}

impl Config {
    /// Reads `LMS_URL`, `LMS_TOKEN`, `LMS_PAGE_SIZE` and `LMS_PREFS_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let base_url = get("LMS_URL").ok_or(ConfigError::Missing("LMS_URL"))?;
        let base_url: Url = base_url.trim().parse().map_err(|err: url::ParseError| {
            ConfigError::Invalid {
                name: "LMS_URL",
                reason: err.to_string(),
            }
        })?;
        if base_url.scheme() != "https" {
            return Err(ConfigError::Invalid {
                name: "LMS_URL",
                reason: "must use https".to_string(),
            });
        }

        let page_size = match get("LMS_PAGE_SIZE") {
            Some(size) => match size.trim().parse::<u32>() {
                Ok(size) if (1..=MAX_PAGE_SIZE).contains(&size) => size,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "LMS_PAGE_SIZE",
                        reason: format!("expected a number from 1 to {}", MAX_PAGE_SIZE),
                    })
                }
            },
            None => DEFAULT_PAGE_SIZE,
        };

        Ok(Config {
            base_url,
            token: get("LMS_TOKEN"),
            page_size,
            prefs_path: get("LMS_PREFS_PATH").map(PathBuf::from),
        })
    }
}

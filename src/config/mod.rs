use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::Result;
use crate::error::Error as RelayError;

mod defaults;
mod env;
mod raw;
mod serde;

pub(crate) use serde::HumantimeDuration;

#[derive(Debug, Clone)]
pub struct Config {
    pub feed: FeedSettings,
    /// Chat sink; absent when no bot token is configured.
    pub telegram: Option<TelegramSettings>,
    /// Push gateway sink; absent when no API key is configured.
    pub push: Option<PushSettings>,
    pub server: ServerSettings,
    pub poll_interval: Duration,
    pub idle_delay: Duration,
    pub liveness_every: u64,
    pub sink_timeout: Duration,
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub url: Url,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub api_url: Url,
    pub token: SecretString,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct PushSettings {
    pub url: Url,
    pub api_key: SecretString,
    pub topic: String,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: SocketAddr,
}

impl Config {
    /// Load configuration from a TOML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, when
    /// environment overrides are invalid, or when the resulting values
    /// fail validation.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut raw = raw::load(path).map_err(RelayError::from)?;
        raw.apply_env_overrides().map_err(RelayError::from)?;
        raw.validate_and_build()
    }
}

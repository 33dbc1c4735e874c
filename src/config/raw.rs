use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use serde_with::serde_as;
use url::Url;

use crate::Result;
use crate::error::ConfigError;

use super::defaults::{
    default_broadcast_capacity, default_connect_timeout, default_feed_url, default_idle_delay,
    default_liveness_every, default_poll_interval, default_push_url, default_request_timeout,
    default_server_bind, default_sink_timeout, default_telegram_api_url,
};
use super::env::{env_duration, env_parse, env_string};
use super::{
    Config, FeedSettings, HumantimeDuration, PushSettings, ServerSettings, TelegramSettings,
};

pub(super) fn load(path: impl AsRef<Path>) -> std::result::Result<RawConfig, ConfigError> {
    let mut builder = ::config::Config::builder();
    let path = path.as_ref();
    builder = builder.add_source(::config::File::from(path).required(false));
    builder = builder.add_source(
        ::config::Environment::with_prefix("CAPRELAY")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .map_err(|err| ConfigError::Other(err.to_string()))?
        .try_deserialize()
        .map_err(|err| ConfigError::Parse(err.to_string()))
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub(super) feed: RawFeed,
    #[serde(default)]
    pub(super) telegram: RawTelegram,
    #[serde(default)]
    pub(super) push: RawPush,
    #[serde(default)]
    pub(super) server: RawServer,
    #[serde(default)]
    pub(super) app: RawApp,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(super) struct RawFeed {
    #[serde(default = "default_feed_url")]
    pub(super) url: String,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) request_timeout: Duration,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) connect_timeout: Duration,
}

impl Default for RawFeed {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RawTelegram {
    #[serde(default = "default_telegram_api_url")]
    pub(super) api_url: String,
    #[serde(default)]
    pub(super) token: Option<String>,
    #[serde(default)]
    pub(super) chat_id: Option<String>,
}

impl Default for RawTelegram {
    fn default() -> Self {
        Self {
            api_url: default_telegram_api_url(),
            token: None,
            chat_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RawPush {
    #[serde(default = "default_push_url")]
    pub(super) url: String,
    #[serde(default)]
    pub(super) api_key: Option<String>,
    #[serde(default)]
    pub(super) topic: Option<String>,
}

impl Default for RawPush {
    fn default() -> Self {
        Self {
            url: default_push_url(),
            api_key: None,
            topic: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RawServer {
    #[serde(default = "default_server_bind")]
    pub(super) bind: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(super) struct RawApp {
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) poll_interval: Duration,
    #[serde(default = "default_idle_delay")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) idle_delay: Duration,
    #[serde(default = "default_liveness_every")]
    pub(super) liveness_every: u64,
    #[serde(default = "default_sink_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) sink_timeout: Duration,
    #[serde(default = "default_broadcast_capacity")]
    pub(super) broadcast_capacity: usize,
}

impl Default for RawApp {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            idle_delay: default_idle_delay(),
            liveness_every: default_liveness_every(),
            sink_timeout: default_sink_timeout(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl RawConfig {
    pub(super) fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        if let Some(url) = env_string("FEED_URL")? {
            self.feed.url = url;
        }
        if let Some(timeout) = env_duration("FEED_TIMEOUT")? {
            self.feed.request_timeout = timeout;
        }
        if let Some(timeout) = env_duration("FEED_CONNECT_TIMEOUT")? {
            self.feed.connect_timeout = timeout;
        }
        if let Some(api_url) = env_string("TELEGRAM_API_URL")? {
            self.telegram.api_url = api_url;
        }
        if let Some(token) = env_string("TELEGRAM_TOKEN")? {
            self.telegram.token = Some(token);
        }
        if let Some(chat_id) = env_string("TELEGRAM_CHAT_ID")? {
            self.telegram.chat_id = Some(chat_id);
        }
        if let Some(url) = env_string("PUSH_URL")? {
            self.push.url = url;
        }
        if let Some(key) = env_string("PUSH_API_KEY")? {
            self.push.api_key = Some(key);
        }
        if let Some(topic) = env_string("PUSH_TOPIC")? {
            self.push.topic = Some(topic);
        }
        if let Some(bind) = env_string("SERVER_BIND")? {
            self.server.bind = bind;
        }
        if let Some(interval) = env_duration("POLL_INTERVAL")? {
            self.app.poll_interval = interval;
        }
        if let Some(delay) = env_duration("IDLE_DELAY")? {
            self.app.idle_delay = delay;
        }
        if let Some(every) = env_parse::<u64>("LIVENESS_EVERY")? {
            self.app.liveness_every = every;
        }
        if let Some(timeout) = env_duration("SINK_TIMEOUT")? {
            self.app.sink_timeout = timeout;
        }
        if let Some(capacity) = env_parse::<usize>("BROADCAST_CAPACITY")? {
            self.app.broadcast_capacity = capacity;
        }
        Ok(())
    }

    pub(super) fn validate_and_build(self) -> Result<Config> {
        let feed_url = Url::parse(&self.feed.url).map_err(|err| ConfigError::InvalidField {
            field: "feed.url",
            message: err.to_string(),
        })?;
        if self.feed.request_timeout.is_zero() || self.feed.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "feed.request_timeout",
                message: "timeouts must be greater than zero".to_string(),
            }
            .into());
        }

        let telegram = match self.telegram.token {
            None => None,
            Some(token) if token.trim().is_empty() => {
                return Err(ConfigError::InvalidField {
                    field: "telegram.token",
                    message: "token cannot be empty".to_string(),
                }
                .into());
            }
            Some(token) => {
                let chat_id = self.telegram.chat_id.ok_or(ConfigError::MissingField {
                    field: "telegram.chat_id",
                })?;
                let api_url =
                    Url::parse(&self.telegram.api_url).map_err(|err| ConfigError::InvalidField {
                        field: "telegram.api_url",
                        message: err.to_string(),
                    })?;
                Some(TelegramSettings {
                    api_url,
                    token: SecretString::from(token),
                    chat_id,
                })
            }
        };

        let push = match self.push.api_key {
            None => None,
            Some(key) if key.trim().is_empty() => {
                return Err(ConfigError::InvalidField {
                    field: "push.api_key",
                    message: "api key cannot be empty".to_string(),
                }
                .into());
            }
            Some(key) => {
                let topic = self.push.topic.ok_or(ConfigError::MissingField {
                    field: "push.topic",
                })?;
                let url = Url::parse(&self.push.url).map_err(|err| ConfigError::InvalidField {
                    field: "push.url",
                    message: err.to_string(),
                })?;
                Some(PushSettings {
                    url,
                    api_key: SecretString::from(key),
                    topic,
                })
            }
        };

        let bind: SocketAddr =
            self.server
                .bind
                .parse()
                .map_err(|err: std::net::AddrParseError| ConfigError::InvalidField {
                    field: "server.bind",
                    message: err.to_string(),
                })?;

        if self.app.poll_interval.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "app.poll_interval",
                message: "poll interval must be greater than zero".to_string(),
            }
            .into());
        }
        if self.app.broadcast_capacity == 0 {
            return Err(ConfigError::InvalidField {
                field: "app.broadcast_capacity",
                message: "broadcast capacity must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(Config {
            feed: FeedSettings {
                url: feed_url,
                request_timeout: self.feed.request_timeout,
                connect_timeout: self.feed.connect_timeout,
            },
            telegram,
            push,
            server: ServerSettings { bind },
            poll_interval: self.app.poll_interval,
            idle_delay: self.app.idle_delay,
            liveness_every: self.app.liveness_every,
            sink_timeout: self.app.sink_timeout,
            broadcast_capacity: self.app.broadcast_capacity,
        })
    }
}

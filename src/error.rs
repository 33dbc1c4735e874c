use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("http server failed: {source}")]
    Server {
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("missing required configuration field: {field}")]
    MissingField { field: &'static str },
    #[error("invalid configuration for {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("configuration error: {0}")]
    Other(String),
}

/// Failures of one fetch+parse cycle. Transport and structural variants
/// are counted by the failure monitor; entry-level problems never reach
/// this type (they surface as skip outcomes from the parser).
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to build HTTP client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    #[error("feed request failed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected feed HTTP status: {status}")]
    HttpStatus { status: reqwest::StatusCode },
    #[error("feed document is not well-formed: {message}")]
    Malformed { message: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request to {sink} failed: {source}")]
    Request {
        sink: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{sink} returned HTTP status {status}")]
    HttpStatus {
        sink: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("failed to encode payload for {sink}: {message}")]
    Payload {
        sink: &'static str,
        message: String,
    },
}

impl From<reqwest::Error> for FeedError {
    fn from(source: reqwest::Error) -> Self {
        if source.is_status() {
            if let Some(status) = source.status() {
                return Self::HttpStatus { status };
            }
        }
        Self::Request { source }
    }
}

impl Error {
    /// True for the cycle-level failures the threshold monitor counts:
    /// transport errors and a structurally unparseable document.
    pub fn is_cycle_failure(&self) -> bool {
        matches!(
            self,
            Self::Feed(
                FeedError::Request { .. }
                    | FeedError::HttpStatus { .. }
                    | FeedError::Malformed { .. }
            )
        )
    }
}

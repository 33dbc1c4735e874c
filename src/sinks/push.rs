use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;
use url::Url;

use super::Sink;
use crate::Result;
use crate::error::{Error, SinkError};
use crate::model::AlertRecord;

const SINK_NAME: &str = "push";

/// Mobile push gateway sink: one POST per alert to a fixed topic, with a
/// key-style authorization header and a trimmed-down field subset.
pub struct PushSink {
    http: reqwest::Client,
    url: Url,
    api_key: SecretString,
    topic: String,
}

impl PushSink {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(url: Url, api_key: SecretString, topic: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("caprelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                Error::Sink(SinkError::Request {
                    sink: SINK_NAME,
                    source: err,
                })
            })?;
        Ok(Self {
            http,
            url,
            api_key,
            topic,
        })
    }

    fn payload(&self, record: &AlertRecord) -> serde_json::Value {
        let detail = record.details.first();
        json!({
            "to": format!("/topics/{}", self.topic),
            "data": {
                "id": record.identifier,
                "title": record.title,
                "sent": record.sent.map(|dt| dt.to_rfc3339()),
                "severity": detail.and_then(|d| d.severity.clone()),
                "description": detail.and_then(|d| d.description.clone()),
                "circle": detail.and_then(|d| d.area_circle.clone()),
            }
        })
    }
}

#[async_trait]
impl Sink for PushSink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    async fn deliver(&self, record: &AlertRecord) -> std::result::Result<(), SinkError> {
        let response = self
            .http
            .post(self.url.clone())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", self.api_key.expose_secret()),
            )
            .json(&self.payload(record))
            .send()
            .await
            .map_err(|source| SinkError::Request {
                sink: SINK_NAME,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::HttpStatus {
                sink: SINK_NAME,
                status,
            });
        }
        debug!(identifier = %record.identifier, topic = %self.topic, "push notification sent");
        Ok(())
    }
}

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

const SINK_NAME: &str = "telegram";

/// Chat notification sink: `sendMessage` against the Telegram bot API.
/// Also carries the escalation notice when the failure monitor fires.
pub struct TelegramSink {
    http: reqwest::Client,
    endpoint: Url,
    chat_id: String,
}

impl TelegramSink {
    /// Build the sink against `api_url` (the production bot API host, or
    /// a mock server in tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL cannot be derived or the
    /// HTTP client fails to build.
    pub fn new(
        api_url: &Url,
        token: &SecretString,
        chat_id: String,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = api_url
            .join(&format!("bot{}/sendMessage", token.expose_secret()))
            .map_err(|err| {
                Error::Config(crate::error::ConfigError::InvalidField {
                    field: "telegram.api_url",
                    message: err.to_string(),
                })
            })?;
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
            endpoint,
            chat_id,
        })
    }

    /// Send free text to the configured chat. Used for the one-shot
    /// escalation notice; alert deliveries go through [`Sink::deliver`].
    ///
    /// # Errors
    ///
    /// Returns a `SinkError` on transport failure or non-2xx status.
    pub async fn send_text(&self, text: &str) -> std::result::Result<(), SinkError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
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
        debug!(chat_id = %self.chat_id, "chat notification sent");
        Ok(())
    }
}

fn message_text(record: &AlertRecord) -> String {
    let mut text = format!(
        "\u{1f6a8} {}\n{}",
        record.title,
        record.updated.format("%Y-%m-%d %H:%M:%S %:z")
    );
    if let Some(headline) = record.headline() {
        text.push('\n');
        text.push_str(headline);
    }
    if let Some(severity) = record.severity() {
        text.push_str("\nSeverity: ");
        text.push_str(severity);
    }
    text
}

#[async_trait]
impl Sink for TelegramSink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    async fn deliver(&self, record: &AlertRecord) -> std::result::Result<(), SinkError> {
        self.send_text(&message_text(record)).await
    }

    fn handles_injected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::message_text;
    use crate::model::{AlertDetail, AlertRecord};

    #[test]
    fn message_includes_headline_and_severity_when_present() {
        let updated = match DateTime::parse_from_rfc3339("2024-05-01T12:00:00-06:00") {
            Ok(dt) => dt,
            Err(err) => panic!("fixture timestamp should parse: {err}"),
        };
        let record = AlertRecord {
            identifier: "X1".to_string(),
            title: "Sismo".to_string(),
            updated,
            sent: None,
            sender: None,
            status: None,
            msg_type: None,
            source: None,
            scope: None,
            code: None,
            note: None,
            references: None,
            details: vec![AlertDetail {
                severity: Some("Moderate".to_string()),
                headline: Some("Alerta Sismica".to_string()),
                ..AlertDetail::default()
            }],
        };

        let text = message_text(&record);
        assert!(text.contains("Sismo"));
        assert!(text.contains("Alerta Sismica"));
        assert!(text.contains("Severity: Moderate"));
    }
}

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One CAP alert lifted out of an Atom feed entry.
///
/// `identifier` is the upstream-assigned dedup key; two records with the
/// same identifier are the same alert. All descriptive fields are
/// optional and serialize as `null` when absent, matching the JSON shape
/// the original relay exposed to its clients.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AlertRecord {
    pub identifier: String,
    pub title: String,
    pub updated: DateTime<FixedOffset>,
    #[serde(default)]
    pub sent: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "msgType")]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub references: Option<String>,
    /// CAP `<info>` blocks in document order; zero or one in practice.
    #[serde(default, rename = "info")]
    pub details: Vec<AlertDetail>,
}

impl AlertRecord {
    /// Severity of the first detail block, if any.
    #[must_use]
    pub fn severity(&self) -> Option<&str> {
        self.details.first().and_then(|d| d.severity.as_deref())
    }

    #[must_use]
    pub fn headline(&self) -> Option<&str> {
        self.details.first().and_then(|d| d.headline.as_deref())
    }
}

/// One CAP `<info>` block.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct AlertDetail {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default, rename = "responseType")]
    pub response_type: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub certainty: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default, rename = "eventCode")]
    pub event_code: Option<String>,
    #[serde(default)]
    pub effective: Option<String>,
    #[serde(default)]
    pub onset: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default, rename = "senderName")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub web: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    /// `<area><circle>` text when the upstream geometry carries one,
    /// encoded as "lat,lon radius".
    #[serde(default, rename = "circle")]
    pub area_circle: Option<String>,
}

//! Pub/Sub push envelope and the Gmail notification it carries.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::DecodeError;
use crate::pipeline::types::Cursor;

/// Body of a Pub/Sub push request.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Standard base64 of the notification JSON.
    pub data: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub publish_time: String,
}

impl PushMessage {
    /// Decode the embedded notification.
    pub fn decode(&self) -> Result<Notification, DecodeError> {
        decode_notification(&self.data)
    }

    /// Parsed publish time, if the publisher supplied a valid RFC 3339 one.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.publish_time)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Gmail's "mailbox changed" notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub email_address: String,
    #[serde(deserialize_with = "deserialize_cursor")]
    pub history_id: Cursor,
}

/// Decode a base64 payload into a [`Notification`].
pub fn decode_notification(data: &str) -> Result<Notification, DecodeError> {
    let bytes = STANDARD.decode(data.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// `historyId` arrives as a JSON number, occasionally as a numeric string.
fn deserialize_cursor<'de, D>(deserializer: D) -> Result<Cursor, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCursor {
        Number(u64),
        Text(String),
    }

    match RawCursor::deserialize(deserializer)? {
        RawCursor::Number(n) => Ok(Cursor(n)),
        RawCursor::Text(s) => s
            .trim()
            .parse()
            .map(Cursor)
            .map_err(|_| serde::de::Error::custom(format!("historyId {s:?} is not a cursor"))),
    }
}

//! Gmail REST client for history deltas, raw message fetch and push watch.
//!
//! Messages are fetched with `format=raw` and parsed locally with
//! `mail-parser`, so header decoding and MIME walking follow RFC 5322/2045
//! rather than Gmail's JSON payload tree.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, PartType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CredentialProvider, MailSource, send_authorized};
use crate::config::WatchConfig;
use crate::error::FetchError;
use crate::pipeline::types::{Cursor, CursorWindow, MailMessage, MessageAdded};

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com";

/// Gmail emits base64url with or without padding depending on the endpoint.
const RAW_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPage {
    #[serde(default)]
    history: Vec<HistoryRecord>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    id: Option<String>,
    #[serde(default)]
    messages_added: Vec<HistoryMessageAdded>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessageAdded {
    message: MessageRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    raw: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchRequest<'a> {
    topic_name: &'a str,
    label_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchReply {
    history_id: String,
    expiration: Option<String>,
}

/// Result of registering a push watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    /// Mailbox cursor at registration time.
    pub history_id: Cursor,
    /// When the watch lapses and must be renewed.
    pub expiration: Option<DateTime<Utc>>,
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail API client for one mailbox.
pub struct GmailClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    user: String,
}

impl GmailClient {
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<dyn CredentialProvider>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            user: user.into(),
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/{}/{path}", self.base_url, self.user)
    }

    async fn send<F>(&self, build: F, what: &str) -> Result<reqwest::Response, FetchError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        send_authorized(self.credentials.as_ref(), build)
            .await
            .map_err(|e| e.into_fetch_error(what))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T, FetchError> {
        let resp = self
            .send(|token| self.http.get(url).bearer_auth(token).query(query), what)
            .await?;
        resp.json()
            .await
            .map_err(|e| FetchError::Malformed(format!("{what}: {e}")))
    }

    /// Register (or renew) the push watch for this mailbox.
    pub async fn watch(&self, watch: &WatchConfig) -> Result<WatchResponse, FetchError> {
        let url = self.api_url("watch");
        let body = WatchRequest {
            topic_name: &watch.topic_name,
            label_ids: &watch.label_ids,
        };
        let resp = self
            .send(
                |token| self.http.post(&url).bearer_auth(token).json(&body),
                "watch",
            )
            .await?;
        let reply: WatchReply = resp
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("watch: {e}")))?;

        let history_id = reply
            .history_id
            .parse()
            .map(Cursor)
            .map_err(|_| FetchError::Malformed(format!("watch historyId {:?}", reply.history_id)))?;
        let expiration = reply
            .expiration
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis);

        info!(history_id = %history_id, expiration = ?expiration, "Gmail watch registered");
        Ok(WatchResponse {
            history_id,
            expiration,
        })
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn fetch_history_delta(
        &self,
        window: CursorWindow,
    ) -> Result<Vec<MessageAdded>, FetchError> {
        let url = self.api_url("history");
        let start = window.previous.to_string();
        let mut page_token: Option<String> = None;
        let mut added = Vec::new();

        loop {
            let mut query = vec![
                ("startHistoryId", start.as_str()),
                ("historyTypes", "messageAdded"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let page: HistoryPage = self.get_json(&url, &query, "history").await?;

            for record in page.history {
                // Records past the window's end belong to the next window.
                let past_end = record
                    .id
                    .as_deref()
                    .and_then(|id| id.parse::<u64>().ok())
                    .is_some_and(|id| id > window.current.0);
                if past_end {
                    continue;
                }
                added.extend(record.messages_added.into_iter().map(|m| MessageAdded {
                    message_id: m.message.id,
                    thread_id: m.message.thread_id,
                }));
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(window = %window, added = added.len(), "History delta fetched");
        Ok(added)
    }

    async fn fetch_message(&self, id: &str) -> Result<MailMessage, FetchError> {
        let url = self.api_url(&format!("messages/{id}"));
        let raw: RawMessage = self
            .get_json(&url, &[("format", "raw")], &format!("message {id}"))
            .await?;
        parse_raw_message(&raw.id, &raw.raw)
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Decode a base64url RFC 822 source and reduce it to a [`MailMessage`].
pub fn parse_raw_message(id: &str, raw: &str) -> Result<MailMessage, FetchError> {
    let bytes = RAW_ENGINE
        .decode(raw.trim())
        .map_err(|e| FetchError::Malformed(format!("message {id} raw body: {e}")))?;
    let parsed = MessageParser::default()
        .parse(bytes.as_slice())
        .ok_or_else(|| FetchError::Malformed(format!("message {id} is not RFC 822")))?;

    let mut message = MailMessage::new(id);

    if let Some(from) = parsed.from().and_then(|addr| addr.first()) {
        let value = match (from.name(), from.address()) {
            (Some(name), Some(address)) => format!("{name} <{address}>"),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        };
        if !value.is_empty() {
            message = message.with_header("From", value);
        }
    }
    if let Some(subject) = parsed.subject() {
        message = message.with_header("Subject", subject);
    }
    if let Some(date) = parsed.date() {
        message = message.with_header("Date", date.to_rfc3339());
    }

    for part in &parsed.parts {
        if let PartType::Text(text) = &part.body
            && !text.trim().is_empty()
        {
            message = message.with_text_part(text.to_string());
        }
    }

    Ok(message)
}

use crate::mime::{self, MessagePart};
use crate::models::{self, STARRED, UNREAD};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("not signed in")]
    Unauthorized,

    #[error("provider rejected the request ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Full message detail as returned by `messages.get?format=full`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelChange {
    pub add_label_ids: Vec<String>,
    pub remove_label_ids: Vec<String>,
}

impl LabelChange {
    pub fn new(add: &[&str], remove: &[&str]) -> Self {
        Self {
            add_label_ids: add.iter().map(|s| s.to_string()).collect(),
            remove_label_ids: remove.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn cleaned(&self) -> Self {
        let keep = |ids: &[String]| -> Vec<String> {
            ids.iter().filter(|id| !id.trim().is_empty()).cloned().collect()
        };
        Self {
            add_label_ids: keep(&self.add_label_ids),
            remove_label_ids: keep(&self.remove_label_ids),
        }
    }

    pub fn is_empty(&self) -> bool {
        let cleaned = self.cleaned();
        cleaned.add_label_ids.is_empty() && cleaned.remove_label_ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    Applied,
    /// Both label arrays were empty; no request was issued.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
}

impl OutgoingMessage {
    pub fn to_rfc822(&self) -> String {
        format!(
            "From: me\r\nTo: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
            header_value(&self.to),
            encode_subject(&header_value(&self.subject)),
            self.body
        )
    }
}

/// Line breaks would start a new header, so they are folded into spaces.
fn header_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// RFC 2047 encoded-word for subjects outside ASCII.
fn encode_subject(subject: &str) -> String {
    if subject.is_ascii() {
        subject.to_string()
    } else {
        format!(
            "=?UTF-8?B?{}?=",
            general_purpose::STANDARD.encode(subject.as_bytes())
        )
    }
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn list_message_ids(&self, token: &str, query: &str, max_results: u32)
        -> Result<Vec<String>>;

    async fn get_message(&self, token: &str, id: &str) -> Result<RawMessage>;

    async fn modify_labels(&self, token: &str, id: &str, change: &LabelChange)
        -> Result<ModifyOutcome>;

    async fn send_message(&self, token: &str, message: &OutgoingMessage) -> Result<String>;
}

#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
}

impl GmailClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(GMAIL_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized);
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body["error"]["message"]
            .as_str()
            .unwrap_or("Unknown error")
            .to_string();
        warn!(status = status.as_u16(), %message, "provider rejected request");
        Err(ProviderError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_message_ids(
        &self,
        token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>> {
        debug!(query, max_results, "listing messages");
        let response = self
            .http
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(token)
            .query(&[("maxResults", max_results.to_string()), ("q", query.to_string())])
            .send()
            .await?;

        let list: ListResponse = Self::check(response).await?.json().await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, token: &str, id: &str) -> Result<RawMessage> {
        let response = self
            .http
            .get(format!("{}/messages/{}", self.base_url, id))
            .bearer_auth(token)
            .query(&[("format", "full")])
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn modify_labels(
        &self,
        token: &str,
        id: &str,
        change: &LabelChange,
    ) -> Result<ModifyOutcome> {
        // The provider answers an empty add/remove pair with a 400.
        if change.is_empty() {
            debug!(id, "skipping modify with no label changes");
            return Ok(ModifyOutcome::Skipped);
        }

        let response = self
            .http
            .post(format!("{}/messages/{}/modify", self.base_url, id))
            .bearer_auth(token)
            .json(&change.cleaned())
            .send()
            .await?;

        Self::check(response).await?;
        Ok(ModifyOutcome::Applied)
    }

    async fn send_message(&self, token: &str, message: &OutgoingMessage) -> Result<String> {
        debug!(to = %message.to, subject = %message.subject, body_len = message.body.len(), "sending message");
        let raw = general_purpose::URL_SAFE_NO_PAD.encode(message.to_rfc822());
        let mut payload = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = &message.thread_id {
            payload["threadId"] = serde_json::Value::String(thread_id.clone());
        }

        let response = self
            .http
            .post(format!("{}/messages/send", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        let sent: SendResponse = Self::check(response).await?.json().await?;
        Ok(sent.id)
    }
}

/// Split a `From` header into a display name and an address.
pub fn split_sender(header: &str) -> (String, String) {
    let name = header
        .split('<')
        .next()
        .unwrap_or_default()
        .replace('"', "")
        .trim()
        .to_string();
    let address = match (header.find('<'), header.rfind('>')) {
        (Some(start), Some(end)) if end > start => header[start + 1..end].trim().to_string(),
        _ => header.trim().to_string(),
    };
    if name.is_empty() {
        (address.clone(), address)
    } else {
        (name, address)
    }
}

/// Turn provider detail into the envelope/body/flags shape the UI shows.
pub fn normalize_message(raw: RawMessage) -> models::Message {
    let payload = &raw.payload;
    let (from, from_address) = split_sender(&payload.header("From"));

    models::Message {
        subject: payload.header("Subject"),
        from,
        from_address,
        to: payload.header("To"),
        cc: payload.header("Cc"),
        date: payload.header("Date"),
        body: mime::extract_body(payload),
        has_attachment: payload.has_attachment(),
        is_unread: raw.label_ids.iter().any(|l| l == UNREAD),
        is_starred: raw.label_ids.iter().any(|l| l == STARRED),
        snippet: raw.snippet,
        thread_id: raw.thread_id,
        id: raw.id,
        enrichment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::Header;

    fn raw_message(headers: &[(&str, &str)], labels: &[&str]) -> RawMessage {
        RawMessage {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            label_ids: labels.iter().map(|l| l.to_string()).collect(),
            snippet: "preview".to_string(),
            payload: MessagePart {
                mime_type: "text/plain".to_string(),
                headers: headers
                    .iter()
                    .map(|(n, v)| Header {
                        name: n.to_string(),
                        value: v.to_string(),
                    })
                    .collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_normalize_defaults_missing_headers_to_empty() {
        let msg = normalize_message(raw_message(&[], &[]));
        assert_eq!(msg.subject, "");
        assert_eq!(msg.from, "");
        assert_eq!(msg.date, "");
        assert_eq!(msg.body, mime::NO_READABLE_CONTENT);
        assert!(!msg.is_unread);
        assert!(msg.enrichment.is_none());
    }

    #[test]
    fn test_normalize_reads_headers_and_flags() {
        let msg = normalize_message(raw_message(
            &[
                ("subject", "Lunch?"),
                ("FROM", "\"Ada Lovelace\" <ada@example.com>"),
                ("Date", "Mon, 1 Jan 2024 10:00:00 +0000"),
            ],
            &["INBOX", "UNREAD", "STARRED"],
        ));
        assert_eq!(msg.subject, "Lunch?");
        assert_eq!(msg.from, "Ada Lovelace");
        assert_eq!(msg.from_address, "ada@example.com");
        assert!(msg.is_unread);
        assert!(msg.is_starred);
    }

    #[test]
    fn test_split_sender_without_display_name() {
        assert_eq!(
            split_sender("bob@example.com"),
            ("bob@example.com".to_string(), "bob@example.com".to_string())
        );
        assert_eq!(
            split_sender("<bob@example.com>"),
            ("bob@example.com".to_string(), "bob@example.com".to_string())
        );
    }

    #[test]
    fn test_label_change_ignores_blank_ids() {
        assert!(LabelChange::default().is_empty());
        assert!(LabelChange::new(&[""], &["  "]).is_empty());
        assert!(!LabelChange::new(&[STARRED], &[]).is_empty());
    }

    #[tokio::test]
    async fn test_empty_modify_never_reaches_the_network() {
        // Nothing listens on this port; any request would fail with a transport error.
        let client = GmailClient::with_base_url("http://127.0.0.1:9", Duration::from_millis(200))
            .unwrap();
        let outcome = client
            .modify_labels("token", "m1", &LabelChange::default())
            .await
            .unwrap();
        assert_eq!(outcome, ModifyOutcome::Skipped);
    }

    #[test]
    fn test_rfc822_layout() {
        let raw = OutgoingMessage {
            to: "ada@example.com".to_string(),
            subject: "Re: Lunch?".to_string(),
            body: "Sure".to_string(),
            thread_id: None,
        }
        .to_rfc822();
        assert!(raw.starts_with("From: me\r\nTo: ada@example.com\r\nSubject: Re: Lunch?\r\n"));
        assert!(raw.ends_with("\r\n\r\nSure"));
    }

    #[test]
    fn test_rfc822_header_injection_is_flattened() {
        let raw = OutgoingMessage {
            to: "ada@example.com\r\nBcc: eve@example.com".to_string(),
            subject: "Hello\nX-Injected: yes".to_string(),
            body: "Line one\r\nLine two".to_string(),
            thread_id: None,
        }
        .to_rfc822();
        let (headers, body) = raw.split_once("\r\n\r\n").unwrap();
        assert_eq!(
            headers.lines().collect::<Vec<_>>(),
            vec![
                "From: me",
                "To: ada@example.com Bcc: eve@example.com",
                "Subject: Hello X-Injected: yes",
                "Content-Type: text/plain; charset=\"UTF-8\"",
            ]
        );
        assert_eq!(body, "Line one\r\nLine two");
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let raw = OutgoingMessage {
            to: "ada@example.com".to_string(),
            subject: "Café".to_string(),
            body: String::new(),
            thread_id: None,
        }
        .to_rfc822();
        let encoded = general_purpose::STANDARD.encode("Café".as_bytes());
        assert!(raw.contains(&format!("Subject: =?UTF-8?B?{}?=\r\n", encoded)));
    }
}

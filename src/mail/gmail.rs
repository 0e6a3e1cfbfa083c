//! Gmail REST backend for `MailProvider`.
//!
//! Thin reqwest client over `gmail/v1/users/me`. Messages are fetched in
//! `format=raw` and decoded with mail-parser; every non-success status is
//! surfaced as a `ProviderError::Http` and fails the run (retry policy
//! lives with the trigger, not here).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::mail::traits::MailProvider;
use crate::mail::types::{ContentType, Message, MessageStub};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Bound on any single provider call; an exceeded timeout is that
/// operation's failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gmail API client.
pub struct GmailClient {
    http: reqwest::Client,
    token: SecretString,
    base_url: String,
}

impl GmailClient {
    pub fn new(token: SecretString) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, token, base_url: GMAIL_BASE_URL.to_string() })
    }

    /// Point the client at a different base URL (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        path: &str,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| request_error(operation, e))?;
        decode_json(operation, response).await
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(operation, e))?;
        decode_json(operation, response).await
    }
}

fn request_error(operation: &str, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout { operation: operation.to_string() }
    } else {
        ProviderError::Request(format!("{operation}: {e}"))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Http { status: status.as_u16(), body });
    }
    Ok(response)
}

async fn decode_json<T: for<'de> Deserialize<'de>>(
    operation: &str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| ProviderError::Decode(format!("{operation}: {e}")))
}

// ── Response shapes ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct ThreadResponse {
    #[serde(default)]
    messages: Vec<ThreadEntry>,
}

#[derive(Deserialize)]
struct ThreadEntry {
    id: String,
    #[serde(default, rename = "labelIds")]
    label_ids: Vec<String>,
}

#[derive(Deserialize)]
struct RawMessageResponse {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: String,
    #[serde(default, rename = "labelIds")]
    label_ids: Vec<String>,
    raw: Option<String>,
}

#[derive(Deserialize)]
struct DraftListResponse {
    #[serde(default)]
    drafts: Vec<DraftEntry>,
}

#[derive(Deserialize)]
struct DraftEntry {
    id: String,
    message: DraftMessageRef,
}

#[derive(Deserialize)]
struct DraftMessageRef {
    id: String,
}

#[derive(Deserialize)]
struct CreatedDraft {
    id: String,
}

#[derive(Deserialize)]
struct MetadataResponse {
    payload: Option<MetadataPayload>,
}

#[derive(Deserialize)]
struct MetadataPayload {
    #[serde(default)]
    headers: Vec<HeaderEntry>,
}

#[derive(Deserialize)]
struct HeaderEntry {
    name: String,
    value: String,
}

// ── Raw MIME decoding ───────────────────────────────────────────────

/// Decode Gmail's base64url `raw` payload; padding varies by endpoint.
fn decode_raw(raw: &str) -> Result<Vec<u8>, ProviderError> {
    URL_SAFE
        .decode(raw)
        .or_else(|_| URL_SAFE_NO_PAD.decode(raw))
        .map_err(|e| ProviderError::Decode(format!("raw message body: {e}")))
}

/// Parse a raw RFC822 message into the pipeline's `Message` record.
///
/// Prefers the text/plain part; falls back to text/html (flagged as HTML
/// so the normalizer strips it).
pub(crate) fn parse_raw_message(
    message_id: &str,
    thread_id: &str,
    label_ids: Vec<String>,
    mime: &[u8],
) -> Result<Message, ProviderError> {
    let parsed = MessageParser::default().parse(mime).ok_or_else(|| {
        ProviderError::Decode(format!("unparseable MIME for message {message_id}"))
    })?;

    let sender = extract_addresses(parsed.from())
        .into_iter()
        .next()
        .unwrap_or_else(|| "unknown".to_string());
    let recipients = extract_addresses(parsed.to());
    let subject = parsed.subject().map(str::to_string);

    let date = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0));
    let date_raw = parsed.date().map(|d| d.to_rfc3339());

    // `body_text` synthesizes a text rendering for HTML-only messages, so
    // check for a genuine text/plain part before trusting it. HTML-only
    // bodies keep their markup and go through the HTML normalizer path.
    let (content_type, raw_content) = if !parsed.text_body.is_empty() {
        (
            ContentType::Plain,
            parsed.body_text(0).map(|t| t.to_string()).unwrap_or_default(),
        )
    } else if let Some(html) = parsed.body_html(0) {
        (ContentType::Html, html.to_string())
    } else {
        (ContentType::Plain, String::new())
    };

    Ok(Message {
        id: message_id.to_string(),
        thread_id: thread_id.to_string(),
        label_ids,
        sender,
        recipients,
        subject,
        date,
        date_raw,
        content_type,
        raw_content,
    })
}

/// Flatten a mail-parser address field into bare address strings.
fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

// ── MailProvider impl ───────────────────────────────────────────────

#[async_trait]
impl MailProvider for GmailClient {
    async fn get_thread(&self, thread_id: &str) -> Result<Vec<MessageStub>, ProviderError> {
        let response: ThreadResponse = self
            .get_json("get_thread", &format!("/threads/{thread_id}?format=minimal"))
            .await?;
        Ok(response
            .messages
            .into_iter()
            .map(|m| MessageStub { id: m.id, label_ids: m.label_ids })
            .collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<Message, ProviderError> {
        let response: RawMessageResponse = self
            .get_json("get_message", &format!("/messages/{message_id}?format=raw"))
            .await?;
        let raw = response.raw.ok_or_else(|| ProviderError::MissingField {
            field: "raw".into(),
            context: format!("message {message_id}"),
        })?;
        let mime = decode_raw(&raw)?;
        parse_raw_message(&response.id, &response.thread_id, response.label_ids, &mime)
    }

    async fn get_current_labels(
        &self,
        thread_id: &str,
    ) -> Result<HashSet<String>, ProviderError> {
        let response: ThreadResponse = self
            .get_json("get_current_labels", &format!("/threads/{thread_id}?format=minimal"))
            .await?;
        Ok(response
            .messages
            .into_iter()
            .flat_map(|m| m.label_ids)
            .collect())
    }

    async fn get_draft_for_message(
        &self,
        message_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let response: DraftListResponse =
            self.get_json("get_draft_for_message", "/drafts").await?;
        Ok(response
            .drafts
            .into_iter()
            .find(|d| d.message.id == message_id)
            .map(|d| d.id))
    }

    async fn get_rfc_message_id(&self, message_id: &str) -> Result<String, ProviderError> {
        let response: MetadataResponse = self
            .get_json(
                "get_rfc_message_id",
                &format!("/messages/{message_id}?format=metadata&metadataHeaders=message-id"),
            )
            .await?;
        response
            .payload
            .into_iter()
            .flat_map(|p| p.headers)
            .find(|h| h.name.eq_ignore_ascii_case("Message-ID"))
            .map(|h| h.value)
            .ok_or_else(|| ProviderError::MissingField {
                field: "Message-ID".into(),
                context: format!("message {message_id}"),
            })
    }

    async fn apply_labels(&self, thread_id: &str, add: &[String]) -> Result<(), ProviderError> {
        debug!(thread_id, count = add.len(), "Applying labels");
        let body = json!({ "addLabelIds": add });
        let _: serde_json::Value = self
            .post_json("apply_labels", &format!("/threads/{thread_id}/modify"), &body)
            .await?;
        Ok(())
    }

    async fn remove_labels(
        &self,
        thread_id: &str,
        remove: &[String],
    ) -> Result<(), ProviderError> {
        let body = json!({ "removeLabelIds": remove });
        let _: serde_json::Value = self
            .post_json("remove_labels", &format!("/threads/{thread_id}/modify"), &body)
            .await?;
        Ok(())
    }

    async fn create_draft(&self, thread_id: &str, raw_mime: &str) -> Result<String, ProviderError> {
        // Threading headers live inside the raw MIME; the drafts payload
        // only carries the encoded message and its thread.
        let body = json!({ "message": { "raw": raw_mime, "threadId": thread_id } });
        let created: CreatedDraft = self.post_json("create_draft", "/drafts", &body).await?;
        Ok(created.id)
    }

    async fn delete_draft(&self, draft_id: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .delete(self.url(&format!("/drafts/{draft_id}")))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| request_error("delete_draft", e))?;
        check_status(response).await?;
        Ok(())
    }

    async fn send(&self, thread_id: &str, raw_mime: &str) -> Result<(), ProviderError> {
        let body = json!({ "raw": raw_mime, "threadId": thread_id });
        let _: serde_json::Value =
            self.post_json("send", "/messages/send", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_raw_accepts_padded_and_unpadded() {
        let data = b"hello mime";
        let padded = URL_SAFE.encode(data);
        let unpadded = URL_SAFE_NO_PAD.encode(data);
        assert_eq!(decode_raw(&padded).unwrap(), data);
        assert_eq!(decode_raw(&unpadded).unwrap(), data);
    }

    #[test]
    fn decode_raw_rejects_garbage() {
        assert!(decode_raw("!!not base64!!").is_err());
    }

    #[test]
    fn parse_raw_message_plain_text() {
        let mime = b"From: Alice <alice@example.com>\r\n\
                     To: sales@company.com\r\n\
                     Subject: Pricing\r\n\
                     Date: Mon, 5 Jan 2026 12:00:00 +0000\r\n\
                     Content-Type: text/plain\r\n\
                     \r\n\
                     How much does it cost?\r\n";
        let msg =
            parse_raw_message("m1", "t1", vec!["INBOX".into()], mime).unwrap();
        assert_eq!(msg.sender, "alice@example.com");
        assert_eq!(msg.recipients, vec!["sales@company.com".to_string()]);
        assert_eq!(msg.subject.as_deref(), Some("Pricing"));
        assert!(msg.date.is_some());
        assert_eq!(msg.content_type, ContentType::Plain);
        assert!(msg.raw_content.contains("How much does it cost?"));
    }

    #[test]
    fn parse_raw_message_html_only() {
        let mime = b"From: bob@example.com\r\n\
                     To: sales@company.com\r\n\
                     Subject: Hi\r\n\
                     Content-Type: text/html\r\n\
                     \r\n\
                     <p>Hello there</p>\r\n";
        let msg = parse_raw_message("m2", "t1", vec![], mime).unwrap();
        assert_eq!(msg.content_type, ContentType::Html);
        assert!(msg.raw_content.contains("<p>"));
    }

    #[test]
    fn parse_raw_message_prefers_genuine_plain_part() {
        let mime = b"From: a@x.com\r\n\
                     To: b@y.com\r\n\
                     Subject: Multi\r\n\
                     MIME-Version: 1.0\r\n\
                     Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
                     \r\n\
                     --b1\r\n\
                     Content-Type: text/plain\r\n\
                     \r\n\
                     plain body\r\n\
                     --b1\r\n\
                     Content-Type: text/html\r\n\
                     \r\n\
                     <p>html body</p>\r\n\
                     --b1--\r\n";
        let msg = parse_raw_message("m4", "t1", vec![], mime).unwrap();
        assert_eq!(msg.content_type, ContentType::Plain);
        assert!(msg.raw_content.contains("plain body"));
        assert!(!msg.raw_content.contains("<p>"));
    }

    #[test]
    fn parse_raw_message_missing_from_falls_back() {
        let mime = b"To: sales@company.com\r\n\
                     Subject: No sender\r\n\
                     \r\n\
                     body\r\n";
        let msg = parse_raw_message("m3", "t1", vec![], mime).unwrap();
        assert_eq!(msg.sender, "unknown");
        assert!(msg.date.is_none());
    }
}

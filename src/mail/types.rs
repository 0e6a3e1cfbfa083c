//! Core mail data model — provider snapshots and their normalized form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mail::normalize;

/// Gmail's marker label for draft messages.
pub const DRAFT_LABEL_ID: &str = "DRAFT";

/// Body content type of a fetched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Plain,
    Html,
}

/// A thread listing entry: message id plus its label ids.
///
/// This is all the thread listing API returns — full content requires a
/// separate per-message fetch.
#[derive(Debug, Clone)]
pub struct MessageStub {
    pub id: String,
    pub label_ids: Vec<String>,
}

impl MessageStub {
    pub fn is_draft(&self) -> bool {
        self.label_ids.iter().any(|l| l == DRAFT_LABEL_ID)
    }
}

/// An immutable message snapshot fetched from the mail provider.
///
/// Never mutated once fetched — a re-fetch produces a new record.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub label_ids: Vec<String>,
    /// Bare sender address, e.g. `alice@example.com`.
    pub sender: String,
    /// Recipient addresses from the To header.
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    /// Parsed Date header; `None` when the header is missing or unparseable.
    pub date: Option<DateTime<Utc>>,
    /// Raw Date header text, kept for display when parsing failed.
    pub date_raw: Option<String>,
    pub content_type: ContentType,
    pub raw_content: String,
}

impl Message {
    pub fn is_draft(&self) -> bool {
        self.label_ids.iter().any(|l| l == DRAFT_LABEL_ID)
    }
}

/// A message after content normalization, with headers carried along.
///
/// `cleaned_content` has HTML, quoted replies, signatures, and boilerplate
/// whitespace removed; normalizing it again is a no-op.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedMessage {
    /// Provider-internal message id (not the RFC Message-ID header).
    pub id: String,
    pub sender: String,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub cleaned_content: String,
    pub content_type: ContentType,
}

impl NormalizedMessage {
    /// Normalize a fetched message, preserving its headers.
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            sender: message.sender.clone(),
            recipient: message.recipients.first().cloned(),
            subject: message.subject.clone(),
            date: message.date,
            cleaned_content: normalize::normalize(&message.raw_content, message.content_type),
            content_type: message.content_type,
        }
    }

    /// Render the message as a headed text block for oracle input.
    ///
    /// Matches the canonical `From/To/Subject/Date` framing the
    /// classification stages expect.
    pub fn as_oracle_block(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nDate: {}\n\n{}",
            self.sender,
            self.recipient.as_deref().unwrap_or(""),
            self.subject.as_deref().unwrap_or(""),
            self.date.map(|d| d.to_rfc2822()).unwrap_or_default(),
            self.cleaned_content
        )
    }
}

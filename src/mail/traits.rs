//! `MailProvider` trait — single async interface to the mail backend.
//!
//! The provider is the system of record: messages, threads, labels, and
//! drafts all live on its side. The pipeline only reads snapshots and
//! issues additive writes.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::mail::types::{Message, MessageStub};

/// Backend-agnostic mail provider trait.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// List all messages in a thread (ids and label ids only).
    async fn get_thread(&self, thread_id: &str) -> Result<Vec<MessageStub>, ProviderError>;

    /// Fetch one full message.
    async fn get_message(&self, message_id: &str) -> Result<Message, ProviderError>;

    /// Current label set for a thread: the union of label ids across all
    /// of its messages.
    async fn get_current_labels(&self, thread_id: &str)
    -> Result<HashSet<String>, ProviderError>;

    /// Resolve the draft id whose underlying message id matches.
    /// `None` means there is no draft to reconcile — not an error.
    async fn get_draft_for_message(
        &self,
        message_id: &str,
    ) -> Result<Option<String>, ProviderError>;

    /// Look up the RFC `Message-ID` header for a message. Distinct from
    /// the provider-internal id; required for reply threading headers.
    async fn get_rfc_message_id(&self, message_id: &str) -> Result<String, ProviderError>;

    /// Add labels to every message in a thread. Additive only.
    async fn apply_labels(&self, thread_id: &str, add: &[String]) -> Result<(), ProviderError>;

    /// Remove labels from every message in a thread. Used only for the
    /// trigger-label cleanup step, never for pipeline-applied labels.
    async fn remove_labels(&self, thread_id: &str, remove: &[String])
    -> Result<(), ProviderError>;

    /// Create a draft on a thread from a base64url-encoded MIME message.
    /// Threading headers (`In-Reply-To`/`References`) travel inside the
    /// MIME itself. Returns the new draft id.
    async fn create_draft(&self, thread_id: &str, raw_mime: &str)
    -> Result<String, ProviderError>;

    /// Delete a draft.
    async fn delete_draft(&self, draft_id: &str) -> Result<(), ProviderError>;

    /// Send a base64url-encoded MIME message on a thread immediately.
    async fn send(&self, thread_id: &str, raw_mime: &str) -> Result<(), ProviderError>;
}

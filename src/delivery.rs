//! Draft/send decision and outbound MIME assembly.
//!
//! Policy: never update a draft in place. An existing draft is deleted
//! and a fresh one created; a failed delete aborts delivery so the user
//! never ends up with two competing drafts on one thread.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::mail::{AssembledThread, MailProvider, ThreadScenario};

/// Whether completed runs produce a draft for review or send outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Draft,
    AutoSend,
}

/// What delivery did for a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    DraftCreated { draft_id: String },
    Sent,
    /// Auto-send was requested but the recipient's domain is outside the
    /// allowlist. Nothing was written; not an error.
    DomainNotAllowlisted { domain: String },
}

/// Inject configured links into placeholder brackets and append the
/// signature block.
///
/// The reply drafter emits bracketed placeholders (`[Case Study]`) rather
/// than URLs. Each placeholder with a configured link becomes
/// `[name](url)`; unconfigured placeholders stay as-is for the reviewer
/// to resolve.
pub fn assemble_reply_body(
    generated: &str,
    links: &HashMap<String, String>,
    signature: Option<&str>,
) -> String {
    let mut body = generated.trim().to_string();
    for (name, url) in links {
        let placeholder = format!("[{name}]");
        if body.contains(&placeholder) {
            body = body.replace(&placeholder, &format!("[{name}]({url})"));
        }
    }
    if let Some(signature) = signature {
        body.push_str("\n\n");
        body.push_str(signature.trim_end());
    }
    body
}

fn recipient_domain(address: &str) -> Option<String> {
    address.rsplit_once('@').map(|(_, domain)| domain.to_ascii_lowercase())
}

fn domain_allowed(allowlist: &[String], domain: &str) -> bool {
    // An empty allowlist disables the gate entirely.
    allowlist.is_empty() || allowlist.iter().any(|d| d.eq_ignore_ascii_case(domain))
}

fn reply_subject(thread: &AssembledThread) -> String {
    match &thread.subject {
        Some(s) if s.to_ascii_lowercase().starts_with("re:") => s.clone(),
        Some(s) => format!("Re: {s}"),
        None => String::new(),
    }
}

/// Build an RFC822 reply and base64url-encode it for the provider.
fn encode_reply(
    config: &PipelineConfig,
    to: &str,
    subject: &str,
    rfc_message_id: Option<&str>,
    body: &str,
) -> Result<String> {
    let from = config
        .mailbox_address
        .parse()
        .map_err(|e| PipelineError::Delivery(format!("invalid mailbox address: {e}")))?;
    let to = to
        .parse()
        .map_err(|e| PipelineError::Delivery(format!("invalid recipient {to:?}: {e}")))?;

    let mut builder = lettre::Message::builder().from(from).to(to).subject(subject);
    if let Some(rfc_id) = rfc_message_id {
        builder = builder.in_reply_to(rfc_id.to_string()).references(rfc_id.to_string());
    }
    let message = builder
        .body(body.to_string())
        .map_err(|e| PipelineError::Delivery(format!("failed to build MIME message: {e}")))?;

    Ok(URL_SAFE.encode(message.formatted()))
}

/// Deliver a generated reply for the thread, per the configured mode.
///
/// Order of operations is fixed: allowlist gate (pure, before any
/// provider call), reply-header resolution, stale-draft delete, then
/// create or send.
pub async fn deliver(
    provider: &dyn MailProvider,
    config: &PipelineConfig,
    thread: &AssembledThread,
    reply_body: &str,
) -> Result<DeliveryOutcome> {
    // A reply goes to the counterparty: the latest inbound sender, or the
    // draft's intended recipient for a user-initiated standalone draft.
    let to = match thread.scenario {
        ThreadScenario::StandaloneDraft => thread.recipient.clone(),
        _ => thread.latest_actionable.as_ref().map(|m| m.sender.clone()),
    }
    .ok_or_else(|| {
        PipelineError::Integrity(format!("no reply recipient for thread {}", thread.thread_id))
    })?;

    let domain = recipient_domain(&to).ok_or_else(|| {
        PipelineError::Delivery(format!("recipient {to:?} has no domain part"))
    })?;
    if !domain_allowed(&config.domain_allowlist, &domain) {
        info!(thread_id = %thread.thread_id, domain, "Recipient domain outside allowlist; skipping delivery");
        return Ok(DeliveryOutcome::DomainNotAllowlisted { domain });
    }

    let rfc_message_id = match &thread.most_recent_message_id {
        Some(id) => Some(provider.get_rfc_message_id(id).await?),
        None => None,
    };

    let subject = reply_subject(thread);
    let raw = encode_reply(config, &to, &subject, rfc_message_id.as_deref(), reply_body)?;

    // Delete-then-recreate: a failed delete aborts before creating.
    if let Some(draft_id) = &thread.draft_id {
        provider.delete_draft(draft_id).await.map_err(|e| PipelineError::DraftDelete {
            draft_id: draft_id.clone(),
            reason: e.to_string(),
        })?;
        info!(thread_id = %thread.thread_id, draft_id, "Deleted stale draft");
    }

    match config.delivery_mode {
        DeliveryMode::Draft => {
            let draft_id = provider.create_draft(&thread.thread_id, &raw).await?;
            info!(thread_id = %thread.thread_id, draft_id, "Created reply draft");
            Ok(DeliveryOutcome::DraftCreated { draft_id })
        }
        DeliveryMode::AutoSend => {
            provider.send(&thread.thread_id, &raw).await?;
            info!(thread_id = %thread.thread_id, to, "Sent reply");
            Ok(DeliveryOutcome::Sent)
        }
    }
}

/// Forward a sensitive thread to the configured stakeholder for human
/// review. Sent on the same thread so context stays attached.
pub async fn forward_to_stakeholder(
    provider: &dyn MailProvider,
    config: &PipelineConfig,
    thread: &AssembledThread,
) -> Result<()> {
    let Some(stakeholder) = &config.stakeholder_address else {
        warn!(thread_id = %thread.thread_id, "Sensitive thread but no stakeholder configured");
        return Ok(());
    };
    let Some(latest) = &thread.latest_actionable else {
        return Err(PipelineError::Integrity(format!(
            "sensitive thread {} has no message to forward",
            thread.thread_id
        ))
        .into());
    };

    let subject = match &thread.subject {
        Some(s) => format!("Fwd: {s}"),
        None => "Fwd:".to_string(),
    };
    let body = format!(
        "A review of the original thread is required before any reply goes out.\n\n\
         ---------- Forwarded message ----------\n{}",
        latest.as_oracle_block()
    );

    let from = config
        .mailbox_address
        .parse()
        .map_err(|e| PipelineError::Delivery(format!("invalid mailbox address: {e}")))?;
    let to = stakeholder
        .parse()
        .map_err(|e| PipelineError::Delivery(format!("invalid stakeholder address: {e}")))?;
    let message = lettre::Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .body(body)
        .map_err(|e| PipelineError::Delivery(format!("failed to build forward: {e}")))?;

    provider
        .send(&thread.thread_id, &URL_SAFE.encode(message.formatted()))
        .await?;
    info!(thread_id = %thread.thread_id, stakeholder, "Forwarded sensitive thread");
    Ok(())
}

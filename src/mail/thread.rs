//! Thread assembly — scenario detection and history/draft partitioning.
//!
//! Turns a provider thread into an `AssembledThread`: normalized history,
//! the latest actionable message, any draft instructions, and the draft id
//! to reconcile against.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::mail::traits::MailProvider;
use crate::mail::types::{MessageStub, NormalizedMessage};

/// Structural classification of a thread by message count and draft-marker
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadScenario {
    /// One or more messages, no trailing draft.
    ThreadNoDraft,
    /// A single message which is itself a draft (user-initiated outbound).
    StandaloneDraft,
    /// An existing conversation with a trailing draft to overwrite.
    ThreadAndDraft,
}

impl ThreadScenario {
    /// Short label for logging and exports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ThreadNoDraft => "thread_no_draft",
            Self::StandaloneDraft => "standalone_draft",
            Self::ThreadAndDraft => "thread_and_draft",
        }
    }

    pub fn has_draft(&self) -> bool {
        matches!(self, Self::StandaloneDraft | Self::ThreadAndDraft)
    }
}

/// Determine the thread scenario from the message stubs.
///
/// Pure function of `(message count, DRAFT marker on first/last message)`:
///
/// | messages | DRAFT on first | DRAFT on last | scenario        |
/// |----------|----------------|---------------|-----------------|
/// | 1        | yes            | —             | StandaloneDraft |
/// | 1        | no             | —             | ThreadNoDraft   |
/// | >1       | —              | yes           | ThreadAndDraft  |
/// | >1       | —              | no            | ThreadNoDraft   |
pub fn determine_scenario(stubs: &[MessageStub]) -> std::result::Result<ThreadScenario, PipelineError> {
    match stubs {
        [] => Err(PipelineError::Integrity("thread has no messages".into())),
        [only] => Ok(if only.is_draft() {
            ThreadScenario::StandaloneDraft
        } else {
            ThreadScenario::ThreadNoDraft
        }),
        [.., last] => Ok(if last.is_draft() {
            ThreadScenario::ThreadAndDraft
        } else {
            ThreadScenario::ThreadNoDraft
        }),
    }
}

/// A fully assembled thread, ready for classification.
#[derive(Debug, Clone)]
pub struct AssembledThread {
    pub thread_id: String,
    pub scenario: ThreadScenario,
    /// Sender of the thread's first message.
    pub sender: String,
    /// First recipient of the thread's first message.
    pub recipient: Option<String>,
    pub subject: Option<String>,
    /// Non-draft messages, oldest first.
    pub history: Vec<NormalizedMessage>,
    /// The most recent non-draft message. `None` only for standalone drafts.
    pub latest_actionable: Option<NormalizedMessage>,
    /// Content of the trailing draft, treated as user instructions for
    /// the reply drafter.
    pub draft_instructions: Option<NormalizedMessage>,
    /// Provider id of the most recent non-draft message (reply-header
    /// resolution starts from here).
    pub most_recent_message_id: Option<String>,
    /// Existing draft entity id, when the scenario has one and the
    /// provider could resolve it.
    pub draft_id: Option<String>,
}

/// Fetch, normalize, and partition a thread.
pub async fn assemble(provider: &dyn MailProvider, thread_id: &str) -> Result<AssembledThread> {
    let stubs = provider.get_thread(thread_id).await?;
    let scenario = determine_scenario(&stubs)?;
    debug!(thread_id, scenario = scenario.label(), messages = stubs.len(), "Assembling thread");

    let mut normalized = Vec::with_capacity(stubs.len());
    for stub in &stubs {
        let message = provider.get_message(&stub.id).await?;
        normalized.push((stub.is_draft(), NormalizedMessage::from_message(&message)));
    }

    // First message carries the thread's identity headers. For a standalone
    // draft that is the draft itself: sender is the mailbox owner and
    // recipient is the draft's intended target.
    let (_, first) = &normalized[0];
    let sender = first.sender.clone();
    let recipient = first.recipient.clone();
    let subject = first.subject.clone();

    // Partition: the trailing draft (when present) is instructions, not history.
    let draft_instructions = if scenario.has_draft() {
        normalized.pop().map(|(_, m)| m)
    } else {
        None
    };
    let mut history: Vec<NormalizedMessage> = normalized
        .into_iter()
        .filter(|(is_draft, _)| !is_draft)
        .map(|(_, m)| m)
        .collect();

    // Provider ordering is not trusted; sort by date when every date parsed.
    if history.iter().all(|m| m.date.is_some()) {
        history.sort_by_key(|m| m.date);
    } else {
        warn!(thread_id, "Unparseable message date(s); keeping provider order");
    }

    let latest_actionable = history.last().cloned();
    if latest_actionable.is_none() && scenario != ThreadScenario::StandaloneDraft {
        return Err(PipelineError::Integrity(format!(
            "no non-draft message found in thread {thread_id} (scenario {})",
            scenario.label()
        ))
        .into());
    }
    let most_recent_message_id = latest_actionable.as_ref().map(|m| m.id.clone());

    let draft_id = match &draft_instructions {
        Some(draft) => provider.get_draft_for_message(&draft.id).await?,
        None => None,
    };

    Ok(AssembledThread {
        thread_id: thread_id.to_string(),
        scenario,
        sender,
        recipient,
        subject,
        history,
        latest_actionable,
        draft_instructions,
        most_recent_message_id,
        draft_id,
    })
}

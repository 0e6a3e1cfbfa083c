//! Classification data model: oracle inputs, stage names, enumerated
//! outputs, and the accumulating `ClassificationResult`.

use serde::Serialize;

use crate::mail::AssembledThread;

/// Canonical oracle input assembled once per run and shared by every
/// classification stage.
#[derive(Debug, Clone)]
pub struct OracleInput {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub content: String,
}

impl OracleInput {
    /// Build the shared input from an assembled thread. Content is the
    /// normalized history, oldest first, one headed block per message.
    pub fn from_thread(thread: &AssembledThread) -> Self {
        let content = thread
            .history
            .iter()
            .map(|m| m.as_oracle_block())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            sender: thread.sender.clone(),
            recipient: thread.recipient.clone().unwrap_or_default(),
            subject: thread.subject.clone().unwrap_or_default(),
            content,
        }
    }

    /// Render as the single-line framing every stage prompt uses.
    pub fn as_prompt(&self) -> String {
        format!(
            "Sender: {}. Recipient: {}. Subject: {}. Content: {}.",
            self.sender, self.recipient, self.subject, self.content
        )
    }
}

/// Stage names, used in logs and oracle error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    RequiresResponse,
    Relevancy,
    Sensitivity,
    Routing,
}

impl StageName {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequiresResponse => "requires_response",
            Self::Relevancy => "relevancy",
            Self::Sensitivity => "sensitivity",
            Self::Routing => "routing",
        }
    }
}

/// Why a run halted before completing all stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// Stage 1 said no response is required (spam, notification).
    NoResponseRequired,
    /// Stage 2 said the thread is not prospecting-related.
    NotProspectingRelated,
    /// Stage 3 flagged the thread as sensitive. No terminal label;
    /// the thread is forwarded for human review instead.
    Sensitive,
}

impl HaltReason {
    /// Terminal label to apply on halt, if any, with its category.
    pub fn terminal_label(&self) -> Option<(crate::labels::LabelCategory, &'static str)> {
        match self {
            Self::NoResponseRequired => {
                Some((crate::labels::LabelCategory::Classification, "NOT_FROM_REAL_PERSON"))
            }
            Self::NotProspectingRelated => {
                Some((crate::labels::LabelCategory::Relevancy, "NON_PROSPECTING_RELATED"))
            }
            Self::Sensitive => None,
        }
    }
}

/// Sales-funnel stages. Conceptually ordered by funnel progression, but
/// no monotonicity is enforced across messages in a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    NotInterested,
    Interested,
    Lead,
    AppointmentScheduled,
    QualifiedToBuy,
    PresentationScheduled,
    DecisionMakerBoughtIn,
    ContractSent,
    ClosedWon,
}

impl FunnelStage {
    /// Parse an oracle-returned funnel label, case-insensitively, with
    /// spaces or underscores between words. `None` means unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace(' ', "_");
        match normalized.as_str() {
            "NOT_INTERESTED" => Some(Self::NotInterested),
            "INTERESTED" => Some(Self::Interested),
            "LEAD" => Some(Self::Lead),
            "APPOINTMENT_SCHEDULED" => Some(Self::AppointmentScheduled),
            "QUALIFIED_TO_BUY" => Some(Self::QualifiedToBuy),
            "PRESENTATION_SCHEDULED" => Some(Self::PresentationScheduled),
            "DECISION_MAKER_BOUGHT_IN" => Some(Self::DecisionMakerBoughtIn),
            "CONTRACT_SENT" => Some(Self::ContractSent),
            "CLOSED_WON" => Some(Self::ClosedWon),
            _ => None,
        }
    }

    /// Canonical label-table name for this stage.
    pub fn label_name(&self) -> &'static str {
        match self {
            Self::NotInterested => "NOT_INTERESTED",
            Self::Interested => "INTERESTED",
            Self::Lead => "LEAD",
            Self::AppointmentScheduled => "APPOINTMENT_SCHEDULED",
            Self::QualifiedToBuy => "QUALIFIED_TO_BUY",
            Self::PresentationScheduled => "PRESENTATION_SCHEDULED",
            Self::DecisionMakerBoughtIn => "DECISION_MAKER_BOUGHT_IN",
            Self::ContractSent => "CONTRACT_SENT",
            Self::ClosedWon => "CLOSED_WON",
        }
    }
}

/// How the conversation reached the inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryType {
    OrganicInbound,
    ColdOutboundReply,
    WarmIntroReply,
}

impl InquiryType {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace(' ', "_");
        match normalized.as_str() {
            "ORGANIC_INBOUND" => Some(Self::OrganicInbound),
            "COLD_OUTBOUND_REPLY" | "COLD_EMAIL_OUTBOUND_REPLY" => Some(Self::ColdOutboundReply),
            "WARM_INTRO_REPLY" => Some(Self::WarmIntroReply),
            _ => None,
        }
    }

    pub fn label_name(&self) -> &'static str {
        match self {
            Self::OrganicInbound => "ORGANIC_INBOUND",
            Self::ColdOutboundReply => "COLD_OUTBOUND_REPLY",
            Self::WarmIntroReply => "WARM_INTRO_REPLY",
        }
    }
}

/// Ideal-customer-profile bucket for the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderCategory {
    Icp1,
    Icp2,
    OtherIcp,
}

impl SenderCategory {
    /// Parse an oracle-returned sender category. The oracle returns the
    /// full descriptive name (`"ICP 1: Silent Giant"`); match on the
    /// leading ICP designator.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.starts_with("ICP 1") || normalized.starts_with("ICP_1") {
            Some(Self::Icp1)
        } else if normalized.starts_with("ICP 2") || normalized.starts_with("ICP_2") {
            Some(Self::Icp2)
        } else if normalized.starts_with("OTHER") || normalized.starts_with("ICP_OTHER") {
            Some(Self::OtherIcp)
        } else {
            None
        }
    }

    pub fn label_name(&self) -> &'static str {
        match self {
            Self::Icp1 => "ICP_1",
            Self::Icp2 => "ICP_2",
            Self::OtherIcp => "OTHER_ICP",
        }
    }
}

/// Output of the scenario-identification oracle call.
///
/// Either field may be absent when the oracle declines to categorize;
/// absent fields simply apply no label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InquiryScenario {
    pub inquiry_type: Option<InquiryType>,
    pub sender_category: Option<SenderCategory>,
}

/// Accumulating classification record for one thread.
///
/// `None` means the stage was never reached (an earlier gate halted the
/// run), distinct from a stage returning an explicit negative.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassificationResult {
    pub requires_response: Option<bool>,
    pub is_relevant: Option<bool>,
    pub is_sensitive: Option<bool>,
    pub funnel_stage: Option<FunnelStage>,
    pub scenario: Option<InquiryScenario>,
}

/// Terminal state of the classification pipeline for one thread.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// All four stages passed.
    Completed { result: ClassificationResult },
    /// A gate failed; `result` holds everything accumulated up to the
    /// halting stage.
    Halted {
        stage: StageName,
        reason: HaltReason,
        result: ClassificationResult,
    },
}

//! Classification oracle — per-stage prompts, calls, and strict output
//! parsing.
//!
//! Every stage has a fixed output schema (a 0/1 code or a closed enum).
//! Out-of-range output is a contract violation and fails the stage; no
//! fallback classification is ever substituted.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::OracleError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::pipeline::types::{
    ClassificationResult, FunnelStage, InquiryScenario, InquiryType, OracleInput, SenderCategory,
    StageName,
};

const CLASSIFY_MAX_TOKENS: u64 = 256;
const DRAFT_MAX_TOKENS: u64 = 1024;

const REQUIRES_RESPONSE_SYSTEM: &str = r#"Function: Response Requirement Classification.
You classify whether an email thread requires a human response.
Emails from automated senders, notifications, newsletters, receipts, or mass marketing do not require a response. Emails written by a real person to this mailbox do.
Respond with a JSON object and nothing else: {"requiresResponse": 1} if a response is required, {"requiresResponse": 0} if not."#;

const RELEVANCY_SYSTEM: &str = r#"Function: Relevancy Classification.
You classify whether an email thread is related to sales prospecting for this mailbox: inbound interest, replies to outreach, introductions, or any conversation with a potential buyer.
Internal operations, vendor billing, recruiting, and personal mail are not prospecting-related.
Respond with a JSON object and nothing else: {"isRelevant": 1} if prospecting-related, {"isRelevant": 0} if not."#;

const SENSITIVITY_SYSTEM: &str = r#"Function: Sensitivity Classification.
You classify whether an email thread contains sensitive content that a human must review before any automated reply: legal matters, complaints, pricing escalations, security questions, or anything reputationally risky.
Respond with a JSON object and nothing else: {"isSensitive": 1} if sensitive, {"isSensitive": 0} if not."#;

const SCENARIO_SYSTEM: &str = r#"Function: Email Scenario Identification.
Identify the type of inquiry and the ICP category of the sender.
- inquiry type options: organic inbound, cold email outbound reply, warm intro reply.
- sender category options: ICP 1, ICP 2, Other ICP Type.
Respond with a JSON object and nothing else: {"inquiry_type": "...", "sender_category": "..."}. Use an empty string for a field you cannot determine."#;

const FUNNEL_SYSTEM: &str = r#"Function: Sentiment and Funnel Stage Classification.
Classify the sender's position in the sales funnel based on the whole thread.
Options: not interested, interested, lead, appointment scheduled, qualified to buy, presentation scheduled, decision maker bought in, contract sent, closed won.
Respond with a JSON object and nothing else: {"label": "..."}."#;

const REPLY_SYSTEM: &str = r#"Function: Reply Drafting.
You draft a reply to the most recent message in a sales email thread, writing as the mailbox owner.
Tone: spartan, direct, helpful. Short paragraphs. No filler, no exclamation marks.
Where a resource link belongs, write a bracketed placeholder such as [Case Study] or [Scheduling Link]; never invent a URL.
Do not add a signature or sign-off name. Output only the reply body text."#;

/// Classification oracle over an injected `LlmProvider`.
///
/// Holds no per-thread state; each method is a pure prompt-call-parse
/// round trip.
pub struct Oracle {
    provider: Arc<dyn LlmProvider>,
}

impl Oracle {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    async fn call(&self, stage: &str, system: &str, user: String) -> Result<String, OracleError> {
        debug!(stage, model = self.provider.model_name(), "Oracle call");
        self.provider
            .complete(CompletionRequest {
                system: system.to_string(),
                user,
                temperature: 0.0,
                max_tokens: CLASSIFY_MAX_TOKENS,
            })
            .await
    }

    /// Stage 1: does this thread require a response at all?
    pub async fn requires_response(&self, input: &OracleInput) -> Result<bool, OracleError> {
        let raw = self
            .call(StageName::RequiresResponse.label(), REQUIRES_RESPONSE_SYSTEM, input.as_prompt())
            .await?;
        parse_binary(StageName::RequiresResponse, &raw, "requiresResponse")
    }

    /// Stage 2: is this thread prospecting-related?
    pub async fn relevancy(&self, input: &OracleInput) -> Result<bool, OracleError> {
        let raw = self
            .call(StageName::Relevancy.label(), RELEVANCY_SYSTEM, input.as_prompt())
            .await?;
        parse_binary(StageName::Relevancy, &raw, "isRelevant")
    }

    /// Stage 3: does this thread need human review before any reply?
    /// The accumulated results from stages 1-2 are passed as context.
    pub async fn sensitivity(
        &self,
        input: &OracleInput,
        prior: &ClassificationResult,
    ) -> Result<bool, OracleError> {
        let user = format!(
            "{} Prior classification: requiresResponse={}, isRelevant={}.",
            input.as_prompt(),
            prior.requires_response.map(u8::from).unwrap_or_default(),
            prior.is_relevant.map(u8::from).unwrap_or_default(),
        );
        let raw = self
            .call(StageName::Sensitivity.label(), SENSITIVITY_SYSTEM, user)
            .await?;
        parse_binary(StageName::Sensitivity, &raw, "isSensitive")
    }

    /// Stage 4a: inquiry type and sender ICP category.
    pub async fn inquiry_scenario(
        &self,
        input: &OracleInput,
    ) -> Result<InquiryScenario, OracleError> {
        let raw = self
            .call("scenario", SCENARIO_SYSTEM, input.as_prompt())
            .await?;
        parse_scenario(&raw)
    }

    /// Stage 4b: funnel stage.
    pub async fn funnel_stage(&self, input: &OracleInput) -> Result<FunnelStage, OracleError> {
        let raw = self
            .call("funnel_stage", FUNNEL_SYSTEM, input.as_prompt())
            .await?;
        parse_funnel(&raw)
    }

    /// Draft a reply body for the thread. Free text, not schema-checked.
    ///
    /// `instructions` is the user's own trailing draft, when one exists;
    /// the model treats it as direction for the reply.
    pub async fn draft_reply(
        &self,
        input: &OracleInput,
        inquiry_type: Option<InquiryType>,
        instructions: Option<&str>,
    ) -> Result<String, OracleError> {
        let mut user = input.as_prompt();
        if let Some(inquiry) = inquiry_type {
            user.push_str(&format!(" Inquiry Type: {}.", inquiry.label_name()));
        }
        if let Some(instructions) = instructions {
            user.push_str(&format!(" Draft instructions from the mailbox owner: {instructions}"));
        }
        debug!(model = self.provider.model_name(), "Oracle call: reply draft");
        let reply = self
            .provider
            .complete(CompletionRequest {
                system: REPLY_SYSTEM.to_string(),
                user,
                temperature: 0.0,
                max_tokens: DRAFT_MAX_TOKENS,
            })
            .await?;
        let reply = reply.trim().to_string();
        if reply.is_empty() {
            return Err(OracleError::RequestFailed { reason: "empty reply draft".into() });
        }
        Ok(reply)
    }
}

// ── Output parsing ──────────────────────────────────────────────────

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

fn parse_object(stage: &str, raw: &str) -> Result<Value, OracleError> {
    serde_json::from_str(&extract_json_object(raw))
        .map_err(|e| OracleError::contract(stage, format!("invalid JSON: {e}")))
}

/// Parse a `{"field": 0|1}` response. Any other value, including other
/// integers, booleans, or strings, violates the contract.
fn parse_binary(stage: StageName, raw: &str, field: &str) -> Result<bool, OracleError> {
    let object = parse_object(stage.label(), raw)?;
    match object.get(field).and_then(Value::as_i64) {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        Some(other) => Err(OracleError::contract(
            stage.label(),
            format!("{field} must be 0 or 1, got {other}"),
        )),
        None => Err(OracleError::contract(
            stage.label(),
            format!("{field} missing or not an integer in {raw:?}"),
        )),
    }
}

fn parse_funnel(raw: &str) -> Result<FunnelStage, OracleError> {
    let object = parse_object("funnel_stage", raw)?;
    let label = object
        .get("label")
        .and_then(Value::as_str)
        .ok_or_else(|| OracleError::contract("funnel_stage", format!("label missing in {raw:?}")))?;
    FunnelStage::parse(label).ok_or_else(|| {
        OracleError::contract("funnel_stage", format!("unknown funnel label {label:?}"))
    })
}

/// Parse the scenario response. An empty or null field means the oracle
/// declined to categorize and maps to `None`; an unrecognized non-empty
/// value is a contract violation.
fn parse_scenario(raw: &str) -> Result<InquiryScenario, OracleError> {
    let object = parse_object("scenario", raw)?;

    let field = |name: &str| -> Option<String> {
        object
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let inquiry_type = match field("inquiry_type") {
        Some(value) => Some(InquiryType::parse(&value).ok_or_else(|| {
            OracleError::contract("scenario", format!("unknown inquiry_type {value:?}"))
        })?),
        None => None,
    };
    let sender_category = match field("sender_category") {
        Some(value) => Some(SenderCategory::parse(&value).ok_or_else(|| {
            OracleError::contract("scenario", format!("unknown sender_category {value:?}"))
        })?),
        None => None,
    };

    Ok(InquiryScenario { inquiry_type, sender_category })
}

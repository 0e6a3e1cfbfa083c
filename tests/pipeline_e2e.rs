//! End-to-end pipeline runs against in-memory provider and LLM mocks.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use chrono::{TimeZone, Utc};

use inbox_pilot::config::PipelineConfig;
use inbox_pilot::delivery::{DeliveryMode, DeliveryOutcome};
use inbox_pilot::error::{OracleError, ProviderError};
use inbox_pilot::labels::{LabelCategory, LabelTable};
use inbox_pilot::llm::{CompletionRequest, LlmProvider};
use inbox_pilot::mail::types::{ContentType, Message, MessageStub};
use inbox_pilot::mail::{MailProvider, ThreadScenario};
use inbox_pilot::pipeline::{Oracle, PipelineRunner, TriggerEvent};

// Stage markers from the oracle system prompts.
const REQUIRES_RESPONSE: &str = "Function: Response Requirement Classification";
const RELEVANCY: &str = "Function: Relevancy Classification";
const SENSITIVITY: &str = "Function: Sensitivity Classification";
const SCENARIO: &str = "Function: Email Scenario Identification";
const FUNNEL: &str = "Function: Sentiment and Funnel Stage Classification";
const REPLY: &str = "Function: Reply Drafting";

/// LLM mock dispatching on the stage marker in the system prompt.
struct MockLlm {
    responses: HashMap<&'static str, String>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockLlm {
    fn new(responses: &[(&'static str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            responses: responses.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        for (marker, response) in &self.responses {
            if request.system.contains(marker) {
                self.calls.lock().unwrap().push(*marker);
                return Ok(response.clone());
            }
        }
        Err(OracleError::RequestFailed {
            reason: format!("unscripted stage: {}", request.system.lines().next().unwrap_or("")),
        })
    }
}

/// Decode a provider-bound payload and pull out its In-Reply-To value.
fn in_reply_to_header(raw_mime: &str) -> String {
    let bytes = base64::engine::general_purpose::URL_SAFE.decode(raw_mime).unwrap_or_default();
    String::from_utf8_lossy(&bytes)
        .lines()
        .find_map(|l| l.strip_prefix("In-Reply-To: ").map(str::to_string))
        .unwrap_or_else(|| "none".into())
}

/// In-memory provider with call recording.
struct MockProvider {
    messages: Vec<Message>,
    draft_entities: HashMap<String, String>,
    applied: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockProvider {
    fn new(messages: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            messages,
            draft_entities: HashMap::new(),
            applied: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn with_draft_entity(messages: Vec<Message>, message_id: &str, draft_id: &str) -> Arc<Self> {
        Arc::new(Self {
            messages,
            draft_entities: [(message_id.to_string(), draft_id.to_string())].into_iter().collect(),
            applied: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn applied(&self) -> HashSet<String> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailProvider for MockProvider {
    async fn get_thread(&self, _: &str) -> Result<Vec<MessageStub>, ProviderError> {
        Ok(self
            .messages
            .iter()
            .map(|m| MessageStub { id: m.id.clone(), label_ids: m.label_ids.clone() })
            .collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<Message, ProviderError> {
        self.messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or(ProviderError::MissingField {
                field: "message".into(),
                context: message_id.into(),
            })
    }

    async fn get_current_labels(&self, _: &str) -> Result<HashSet<String>, ProviderError> {
        let mut labels: HashSet<String> =
            self.messages.iter().flat_map(|m| m.label_ids.clone()).collect();
        labels.extend(self.applied.lock().unwrap().iter().cloned());
        Ok(labels)
    }

    async fn get_draft_for_message(&self, message_id: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.draft_entities.get(message_id).cloned())
    }

    async fn get_rfc_message_id(&self, message_id: &str) -> Result<String, ProviderError> {
        self.record(format!("rfc_id:{message_id}"));
        Ok(format!("<{message_id}@mail.example.com>"))
    }

    async fn apply_labels(&self, _: &str, add: &[String]) -> Result<(), ProviderError> {
        self.record(format!("apply:{}", add.join(",")));
        self.applied.lock().unwrap().extend(add.iter().cloned());
        Ok(())
    }

    async fn remove_labels(&self, _: &str, remove: &[String]) -> Result<(), ProviderError> {
        self.record(format!("remove:{}", remove.join(",")));
        Ok(())
    }

    async fn create_draft(&self, _: &str, raw_mime: &str) -> Result<String, ProviderError> {
        self.record(format!("create_draft:{}", in_reply_to_header(raw_mime)));
        Ok("d-new".into())
    }

    async fn delete_draft(&self, draft_id: &str) -> Result<(), ProviderError> {
        self.record(format!("delete_draft:{draft_id}"));
        Ok(())
    }

    async fn send(&self, _: &str, _: &str) -> Result<(), ProviderError> {
        self.record("send");
        Ok(())
    }
}

fn message(id: &str, draft: bool, sender: &str, day: u32, body: &str) -> Message {
    let mut label_ids = vec!["INBOX".to_string()];
    if draft {
        label_ids.push("DRAFT".to_string());
    }
    Message {
        id: id.into(),
        thread_id: "t1".into(),
        label_ids,
        sender: sender.into(),
        recipients: vec!["sales@company.com".into()],
        subject: Some("Pricing question".into()),
        date: Some(Utc.with_ymd_and_hms(2026, 1, day, 12, 0, 0).unwrap()),
        date_raw: None,
        content_type: ContentType::Plain,
        raw_content: body.into(),
    }
}

fn label_table() -> LabelTable {
    let mut table: HashMap<LabelCategory, HashMap<String, String>> = HashMap::new();
    table.insert(
        LabelCategory::Classification,
        [("NOT_FROM_REAL_PERSON".to_string(), "Label_5".to_string())].into_iter().collect(),
    );
    table.insert(
        LabelCategory::Relevancy,
        [("NON_PROSPECTING_RELATED".to_string(), "Label_6".to_string())].into_iter().collect(),
    );
    table.insert(
        LabelCategory::Scenario,
        [
            ("COLD_OUTBOUND_REPLY".to_string(), "Label_10".to_string()),
            ("ICP_1".to_string(), "Label_11".to_string()),
        ]
        .into_iter()
        .collect(),
    );
    table.insert(
        LabelCategory::FunnelStage,
        [("QUALIFIED_TO_BUY".to_string(), "Label_24".to_string())].into_iter().collect(),
    );
    LabelTable(table)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        mailbox_address: "sales@company.com".into(),
        delivery_mode: DeliveryMode::Draft,
        domain_allowlist: Vec::new(),
        stakeholder_address: Some("vp@company.com".into()),
        trigger_label_id: Some("Label_trigger".into()),
        autodrafted_label_id: Some("Label_autodrafted".into()),
        labels: label_table(),
        signature_block: Some("Jane Doe\nCompany".into()),
        links: HashMap::new(),
    }
}

fn runner(provider: Arc<MockProvider>, llm: Arc<MockLlm>) -> PipelineRunner {
    PipelineRunner::new(provider, Oracle::new(llm), config())
}

#[tokio::test]
async fn spam_thread_gets_terminal_label_and_nothing_else() {
    let provider = MockProvider::new(vec![message(
        "m1",
        false,
        "noreply@notifications.example.com",
        5,
        "Your weekly digest is here!",
    )]);
    let llm = MockLlm::new(&[(REQUIRES_RESPONSE, r#"{"requiresResponse": 0}"#)]);

    let report = runner(provider.clone(), llm.clone())
        .run(&TriggerEvent { thread_id: "t1".into() })
        .await
        .unwrap();

    assert_eq!(report.outcome, "halted:requires_response");
    assert_eq!(report.applied_labels, vec!["Label_5".to_string()]);
    assert_eq!(report.delivery, None);
    assert_eq!(llm.call_count(), 1, "no oracle call past the failed gate");
    assert_eq!(provider.applied(), ["Label_5".to_string()].into_iter().collect());
    // Trigger label removed at the end of the run.
    assert!(provider.calls().iter().any(|c| c == "remove:Label_trigger"));
    assert!(!provider.calls().iter().any(|c| c.starts_with("create_draft") || c == "send"));
}

#[tokio::test]
async fn sensitive_thread_forwards_and_applies_no_labels() {
    let provider = MockProvider::new(vec![message(
        "m1",
        false,
        "alice@bigco.com",
        5,
        "Our legal team has concerns about the contract terms.",
    )]);
    let llm = MockLlm::new(&[
        (REQUIRES_RESPONSE, r#"{"requiresResponse": 1}"#),
        (RELEVANCY, r#"{"isRelevant": 1}"#),
        (SENSITIVITY, r#"{"isSensitive": 1}"#),
    ]);

    let report = runner(provider.clone(), llm.clone())
        .run(&TriggerEvent { thread_id: "t1".into() })
        .await
        .unwrap();

    assert_eq!(report.outcome, "halted:sensitivity");
    assert_eq!(report.classification.is_sensitive, Some(true));
    assert!(report.applied_labels.is_empty(), "sensitive halt applies no labels");
    assert!(provider.applied().is_empty());
    assert_eq!(llm.call_count(), 3, "routing pair never invoked");
    // Forwarded for human review, no draft created.
    assert!(provider.calls().iter().any(|c| c == "send"));
    assert!(!provider.calls().iter().any(|c| c.starts_with("create_draft")));
}

#[tokio::test]
async fn qualified_lead_gets_labels_and_a_fresh_draft() {
    let provider = MockProvider::with_draft_entity(
        vec![
            message("m1", false, "alice@bigco.com", 3, "Interested in a demo."),
            message("m2", false, "sales@company.com", 4, "Happy to set one up."),
            message("m3", false, "alice@bigco.com", 5, "We have budget approved, send terms."),
            message("m4", true, "sales@company.com", 6, "mention the enterprise tier"),
        ],
        "m4",
        "d-old",
    );
    let llm = MockLlm::new(&[
        (REQUIRES_RESPONSE, r#"{"requiresResponse": 1}"#),
        (RELEVANCY, r#"{"isRelevant": 1}"#),
        (SENSITIVITY, r#"{"isSensitive": 0}"#),
        (
            SCENARIO,
            r#"{"inquiry_type": "cold email outbound reply", "sender_category": "ICP 1: Silent Giant"}"#,
        ),
        (FUNNEL, r#"{"label": "qualified to buy"}"#),
        (REPLY, "Thanks for confirming budget. Terms attached."),
    ]);

    let report = runner(provider.clone(), llm.clone())
        .run(&TriggerEvent { thread_id: "t1".into() })
        .await
        .unwrap();

    assert_eq!(report.outcome, "completed");
    assert_eq!(report.scenario, ThreadScenario::ThreadAndDraft);

    // Three classification labels plus the autodrafted marker.
    let expected: HashSet<String> =
        ["Label_10", "Label_11", "Label_24", "Label_autodrafted"]
            .into_iter()
            .map(String::from)
            .collect();
    assert_eq!(provider.applied(), expected);

    assert_eq!(
        report.delivery,
        Some(DeliveryOutcome::DraftCreated { draft_id: "d-new".into() })
    );

    let calls = provider.calls();
    // Reply headers resolved from the most recent non-draft message.
    assert!(calls.iter().any(|c| c == "rfc_id:m3"));
    assert!(calls.iter().any(|c| c == "create_draft:<m3@mail.example.com>"));
    // Stale draft deleted before the new one was created.
    let delete_pos = calls.iter().position(|c| c == "delete_draft:d-old").unwrap();
    let create_pos = calls.iter().position(|c| c.starts_with("create_draft")).unwrap();
    assert!(delete_pos < create_pos, "delete must precede create: {calls:?}");
}

#[tokio::test]
async fn rerun_applies_no_duplicate_labels() {
    let provider = MockProvider::new(vec![message(
        "m1",
        false,
        "noreply@spam.example.com",
        5,
        "Buy now!",
    )]);
    let llm = MockLlm::new(&[(REQUIRES_RESPONSE, r#"{"requiresResponse": 0}"#)]);
    let runner = runner(provider.clone(), llm);

    let first = runner.run(&TriggerEvent { thread_id: "t1".into() }).await.unwrap();
    assert_eq!(first.applied_labels, vec!["Label_5".to_string()]);

    let second = runner.run(&TriggerEvent { thread_id: "t1".into() }).await.unwrap();
    assert!(second.applied_labels.is_empty(), "reconciliation found nothing to write");
    let writes = provider.calls().iter().filter(|c| c.starts_with("apply:")).count();
    assert_eq!(writes, 1);
}

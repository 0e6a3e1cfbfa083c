//! One full pipeline run: assemble, classify, label, draft, deliver.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::delivery::{self, DeliveryOutcome};
use crate::error::Result;
use crate::labels::{self, LabelCategory};
use crate::mail::{self, MailProvider, ThreadScenario};
use crate::pipeline::classify::classify;
use crate::pipeline::stages::Oracle;
use crate::pipeline::types::{ClassificationResult, OracleInput, PipelineOutcome};

/// The inbox event that starts a run.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub thread_id: String,
}

/// What one run did, for logs and downstream consumers.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub thread_id: String,
    pub scenario: ThreadScenario,
    pub classification: ClassificationResult,
    /// `completed`, or the halt reason.
    pub outcome: String,
    /// Provider label ids actually written this run.
    pub applied_labels: Vec<String>,
    pub delivery: Option<DeliveryOutcome>,
}

/// Orchestrates runs against an injected provider and oracle.
pub struct PipelineRunner {
    provider: Arc<dyn MailProvider>,
    oracle: Oracle,
    config: PipelineConfig,
}

impl PipelineRunner {
    pub fn new(provider: Arc<dyn MailProvider>, oracle: Oracle, config: PipelineConfig) -> Self {
        Self { provider, oracle, config }
    }

    /// Resolve a classification name through the label table and apply
    /// it. A name missing from the table is logged and skipped, never
    /// fatal: an unmapped label must not lose the thread's draft.
    async fn apply_named_label(
        &self,
        thread_id: &str,
        category: LabelCategory,
        name: &str,
        applied: &mut Vec<String>,
    ) -> Result<()> {
        let Some(label_id) = self.config.labels.lookup(category, name) else {
            warn!(thread_id, ?category, name, "No label id mapped; skipping");
            return Ok(());
        };
        let desired: HashSet<String> = [label_id.to_string()].into_iter().collect();
        let written = labels::reconcile(self.provider.as_ref(), thread_id, &desired).await?;
        applied.extend(written);
        Ok(())
    }

    /// Run the pipeline for one triggering thread.
    pub async fn run(&self, event: &TriggerEvent) -> Result<RunReport> {
        let thread_id = &event.thread_id;
        info!(thread_id, "Starting pipeline run");

        let thread = mail::assemble(self.provider.as_ref(), thread_id).await?;
        let input = OracleInput::from_thread(&thread);
        let outcome = classify(&self.oracle, &input).await?;

        let mut applied = Vec::new();
        let mut delivery_outcome = None;

        let (classification, outcome_label) = match outcome {
            PipelineOutcome::Halted { stage, reason, result } => {
                info!(thread_id, stage = stage.label(), ?reason, "Pipeline halted");
                if let Some((category, name)) = reason.terminal_label() {
                    self.apply_named_label(thread_id, category, name, &mut applied).await?;
                } else {
                    // Sensitive: no labels, route to a human instead.
                    delivery::forward_to_stakeholder(
                        self.provider.as_ref(),
                        &self.config,
                        &thread,
                    )
                    .await?;
                }
                (result, format!("halted:{}", stage.label()))
            }
            PipelineOutcome::Completed { result } => {
                if let Some(scenario) = result.scenario {
                    if let Some(inquiry) = scenario.inquiry_type {
                        self.apply_named_label(
                            thread_id,
                            LabelCategory::Scenario,
                            inquiry.label_name(),
                            &mut applied,
                        )
                        .await?;
                    }
                    if let Some(category) = scenario.sender_category {
                        self.apply_named_label(
                            thread_id,
                            LabelCategory::Scenario,
                            category.label_name(),
                            &mut applied,
                        )
                        .await?;
                    }
                }
                if let Some(funnel) = result.funnel_stage {
                    self.apply_named_label(
                        thread_id,
                        LabelCategory::FunnelStage,
                        funnel.label_name(),
                        &mut applied,
                    )
                    .await?;
                }

                let reply = self
                    .oracle
                    .draft_reply(
                        &input,
                        result.scenario.and_then(|s| s.inquiry_type),
                        thread.draft_instructions.as_ref().map(|d| d.cleaned_content.as_str()),
                    )
                    .await?;
                let body = delivery::assemble_reply_body(
                    &reply,
                    &self.config.links,
                    self.config.signature_block.as_deref(),
                );
                let outcome =
                    delivery::deliver(self.provider.as_ref(), &self.config, &thread, &body)
                        .await?;

                if matches!(outcome, DeliveryOutcome::DraftCreated { .. })
                    && let Some(marker) = &self.config.autodrafted_label_id
                {
                    let desired: HashSet<String> = [marker.clone()].into_iter().collect();
                    let written =
                        labels::reconcile(self.provider.as_ref(), thread_id, &desired).await?;
                    applied.extend(written);
                }

                delivery_outcome = Some(outcome);
                (result, "completed".to_string())
            }
        };

        // Trigger-label cleanup runs last so a crashed run stays visible
        // in the triggering label for reprocessing. Failure here only
        // risks one duplicate run, so it is logged, not fatal.
        if let Some(trigger) = &self.config.trigger_label_id
            && let Err(e) = self.provider.remove_labels(thread_id, &[trigger.clone()]).await
        {
            warn!(thread_id, error = %e, "Failed to remove trigger label");
        }

        info!(thread_id, outcome = outcome_label, labels = applied.len(), "Run finished");
        Ok(RunReport {
            thread_id: thread_id.clone(),
            scenario: thread.scenario,
            classification,
            outcome: outcome_label,
            applied_labels: applied,
            delivery: delivery_outcome,
        })
    }
}

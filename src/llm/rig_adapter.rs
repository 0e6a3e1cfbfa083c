//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};
use rig::message::Message;

use crate::error::OracleError;
use crate::llm::provider::{CompletionRequest, LlmProvider};

/// Adapter wrapping any rig `CompletionModel`.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self { model, model_name: model_name.to_string() }
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        let response = self
            .model
            .completion_request(Message::user(request.user))
            .preamble(request.system)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed { reason: e.to_string() })?;

        let text: String = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(OracleError::RequestFailed {
                reason: format!("empty completion from {}", self.model_name),
            });
        }
        Ok(text)
    }
}

//! `LlmProvider` — the narrow async seam between the pipeline and the
//! model transport. Stages build prompts; providers return raw text.

use async_trait::async_trait;

use crate::error::OracleError;

/// One completion call: a system preamble, a user message, and sampling
/// parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Async text-completion provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Run one completion and return the assistant's text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError>;
}

//! Error types for Inbox Pilot.

/// Top-level error type for a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail-provider errors. All of these are transient from the pipeline's
/// point of view: the run fails and retry policy lives with the trigger.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Provider request timed out during {operation}")]
    Timeout { operation: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Missing field {field} in provider response for {context}")]
    MissingField { field: String, context: String },
}

/// Classification-oracle errors.
///
/// A `ContractViolation` means the oracle produced output outside its
/// declared schema. No fallback classification is ever substituted —
/// guessing risks misrouting sales-sensitive email.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle contract violation in stage {stage}: {reason}")]
    ContractViolation { stage: String, reason: String },

    #[error("Oracle request failed: {reason}")]
    RequestFailed { reason: String },
}

impl OracleError {
    /// Shorthand for a contract violation in a named stage.
    pub fn contract(stage: &str, reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}

/// Pipeline-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Thread structure inconsistent with its detected scenario.
    /// Fatal to the run; logged with full thread context, never retried.
    #[error("Thread integrity error: {0}")]
    Integrity(String),

    #[error("Failed to apply labels to thread {thread_id}: {reason}")]
    LabelApplication { thread_id: String, reason: String },

    #[error("Failed to delete draft {draft_id}: {reason}")]
    DraftDelete { draft_id: String, reason: String },

    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The concurrent routing pair did not complete cleanly. Both
    /// outcomes are reported; no labels from either call were applied.
    #[error("Routing stage join failed (scenario: {scenario}; funnel: {funnel})")]
    RoutingJoin { scenario: String, funnel: String },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

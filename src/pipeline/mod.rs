//! Classification pipeline: staged oracle calls over assembled threads,
//! plus the run orchestrator.

pub mod classify;
pub mod runner;
pub mod stages;
pub mod types;

pub use classify::classify;
pub use runner::{PipelineRunner, RunReport, TriggerEvent};
pub use stages::Oracle;
pub use types::{
    ClassificationResult, FunnelStage, HaltReason, InquiryScenario, InquiryType, OracleInput,
    PipelineOutcome, SenderCategory, StageName,
};

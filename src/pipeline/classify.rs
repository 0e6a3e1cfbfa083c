//! Staged, gated classification over one thread.
//!
//! Stages 1-3 run strictly in sequence; each failing gate halts the run
//! before any later oracle call is issued. Stage 4 fans out into two
//! concurrent oracle calls joined with an all-or-nothing barrier.

use tracing::info;

use crate::error::{Error, PipelineError, Result};
use crate::pipeline::stages::Oracle;
use crate::pipeline::types::{
    ClassificationResult, HaltReason, OracleInput, PipelineOutcome, StageName,
};

/// Run the full classification pipeline for one thread.
pub async fn classify(oracle: &Oracle, input: &OracleInput) -> Result<PipelineOutcome> {
    let mut result = ClassificationResult::default();

    // Stage 1: spam/notification filter.
    let requires_response = oracle.requires_response(input).await?;
    result.requires_response = Some(requires_response);
    if !requires_response {
        info!(stage = StageName::RequiresResponse.label(), "Gate failed; halting");
        return Ok(PipelineOutcome::Halted {
            stage: StageName::RequiresResponse,
            reason: HaltReason::NoResponseRequired,
            result,
        });
    }

    // Stage 2: prospecting relevancy.
    let is_relevant = oracle.relevancy(input).await?;
    result.is_relevant = Some(is_relevant);
    if !is_relevant {
        info!(stage = StageName::Relevancy.label(), "Gate failed; halting");
        return Ok(PipelineOutcome::Halted {
            stage: StageName::Relevancy,
            reason: HaltReason::NotProspectingRelated,
            result,
        });
    }

    // Stage 3: sensitivity, with stages 1-2 as oracle context.
    let is_sensitive = oracle.sensitivity(input, &result).await?;
    result.is_sensitive = Some(is_sensitive);
    if is_sensitive {
        info!(stage = StageName::Sensitivity.label(), "Sensitive thread; halting");
        return Ok(PipelineOutcome::Halted {
            stage: StageName::Sensitivity,
            reason: HaltReason::Sensitive,
            result,
        });
    }

    // Stage 4: scenario and funnel stage, concurrently. Either failure
    // fails the pair; no partial result reaches label application.
    let (scenario, funnel) =
        tokio::join!(oracle.inquiry_scenario(input), oracle.funnel_stage(input));
    match (scenario, funnel) {
        (Ok(scenario), Ok(funnel)) => {
            result.scenario = Some(scenario);
            result.funnel_stage = Some(funnel);
            Ok(PipelineOutcome::Completed { result })
        }
        (scenario, funnel) => {
            let describe = |r: &std::result::Result<_, crate::error::OracleError>| match r {
                Ok(_) => "completed".to_string(),
                Err(e) => e.to_string(),
            };
            Err(Error::Pipeline(PipelineError::RoutingJoin {
                scenario: describe(&scenario.map(|_| ())),
                funnel: describe(&funnel.map(|_| ())),
            }))
        }
    }
}

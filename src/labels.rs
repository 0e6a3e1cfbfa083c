//! Label table and idempotent label reconciliation.
//!
//! Classification outputs are names (`QUALIFIED_TO_BUY`); the provider
//! wants opaque label ids (`Label_24`). The table maps between them per
//! category, and `reconcile` writes only the delta against the thread's
//! current label set.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::mail::MailProvider;

/// Label namespaces, one per classification concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCategory {
    Classification,
    Relevancy,
    Scenario,
    FunnelStage,
}

/// Per-category mapping from canonical label names to provider label ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelTable(pub HashMap<LabelCategory, HashMap<String, String>>);

impl LabelTable {
    /// Resolve a label name to its provider id.
    ///
    /// Names are normalized before lookup (uppercased, spaces to
    /// underscores) so oracle-shaped names like `"qualified to buy"`
    /// resolve against table keys like `"QUALIFIED_TO_BUY"`.
    pub fn lookup(&self, category: LabelCategory, name: &str) -> Option<&str> {
        let normalized = name.trim().to_ascii_uppercase().replace(' ', "_");
        self.0
            .get(&category)
            .and_then(|names| names.get(&normalized))
            .map(String::as_str)
    }
}

/// Apply exactly the labels from `desired` that the thread does not
/// already carry. Returns the set actually written.
///
/// Reconciliation is idempotent: a second call with the same inputs
/// finds an empty delta and issues no write. The current set is the
/// union of label ids across the thread's messages; a concurrent writer
/// can still race, in which case the provider's modify call is additive
/// and converges anyway.
pub async fn reconcile(
    provider: &dyn MailProvider,
    thread_id: &str,
    desired: &HashSet<String>,
) -> Result<HashSet<String>> {
    let current = provider.get_current_labels(thread_id).await?;
    let delta: Vec<String> = desired.difference(&current).cloned().collect();

    if delta.is_empty() {
        debug!(thread_id, "Labels already present; nothing to apply");
        return Ok(HashSet::new());
    }

    provider
        .apply_labels(thread_id, &delta)
        .await
        .map_err(|e| PipelineError::LabelApplication {
            thread_id: thread_id.to_string(),
            reason: e.to_string(),
        })?;
    info!(thread_id, applied = ?delta, "Applied labels");
    Ok(delta.into_iter().collect())
}

use graph_flow::Context;
use serde::{Deserialize, Serialize};

use crate::{error::Warning, lang_graph::session_keys};

/// Snapshot of one run's state, rebuilt from the session context once the
/// graph has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub original_query: String,
    /// Raw rewriter response, marker line included.
    pub rewritten_query: String,
    /// The search query actually issued for each subject.
    pub subject_queries: Vec<String>,
    pub per_subject_syntheses: Vec<String>,
    pub aggregated_synthesis: String,
    /// Number of subjects searched so far.
    pub subject_cursor: usize,
    pub relevant_fields: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl PipelineState {
    pub async fn from_context(context: &Context) -> Self {
        Self {
            original_query: context
                .get(session_keys::USER_QUERY)
                .await
                .unwrap_or_default(),
            rewritten_query: context
                .get(session_keys::REWRITTEN_QUERY)
                .await
                .unwrap_or_default(),
            subject_queries: context
                .get(session_keys::SUBJECT_QUERIES)
                .await
                .unwrap_or_default(),
            per_subject_syntheses: context
                .get(session_keys::PER_SUBJECT_SYNTHESES)
                .await
                .unwrap_or_default(),
            aggregated_synthesis: context
                .get(session_keys::AGGREGATED_SYNTHESIS)
                .await
                .unwrap_or_default(),
            subject_cursor: context
                .get(session_keys::SUBJECT_CURSOR)
                .await
                .unwrap_or_default(),
            relevant_fields: context
                .get(session_keys::RELEVANT_FIELDS)
                .await
                .unwrap_or_default(),
            warnings: context
                .get(session_keys::WARNINGS)
                .await
                .unwrap_or_default(),
        }
    }
}

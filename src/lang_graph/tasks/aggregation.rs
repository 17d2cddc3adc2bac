use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument, Span};

use crate::{
    error::{PipelineError, Stage},
    lang_graph::{
        prompts::PromptSet,
        session_keys,
        utils::{fail, require, session_id},
    },
    llm::{CompletionRequest, LanguageModel},
};

/// Consolidates the per-subject syntheses into one answer covering the
/// fields the user asked about.
pub struct AggregationTask {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptSet>,
}

impl AggregationTask {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<PromptSet>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl Task for AggregationTask {
    #[instrument(name = "aggregation_task", skip(self, context), fields(session_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let session_id = session_id(&context).await;
        Span::current().record("session_id", &session_id);
        info!("Entering cross-subject aggregation");

        let user_query: String = require(&context, session_keys::USER_QUERY).await?;
        let subject_count: usize = require(&context, session_keys::SUBJECT_COUNT).await?;
        let syntheses: Vec<String> = context
            .get(session_keys::PER_SUBJECT_SYNTHESES)
            .await
            .unwrap_or_default();

        if syntheses.len() != subject_count {
            return Err(fail(
                &context,
                PipelineError::SynthesisCountMismatch {
                    expected: subject_count,
                    found: syntheses.len(),
                },
            )
            .await);
        }

        let data = serde_json::to_string_pretty(&syntheses)
            .unwrap_or_else(|_| syntheses.join("\n\n"));
        let messages = self
            .prompts
            .aggregation
            .messages(&[("query", &user_query), ("syntheses", &data)]);
        debug!(messages = messages.len(), "Aggregation prompt built");

        let aggregated = match self.llm.complete(&CompletionRequest::text(messages)).await {
            Ok(aggregated) => aggregated,
            Err(e) => {
                return Err(fail(
                    &context,
                    PipelineError::LanguageModel {
                        stage: Stage::Aggregation,
                        reason: format!("{e:#}"),
                    },
                )
                .await)
            }
        };
        debug!(%aggregated, "Aggregated synthesis");

        context
            .set(session_keys::AGGREGATED_SYNTHESIS, aggregated)
            .await;

        Ok(TaskResult::new(
            Some(format!("Aggregated {subject_count} syntheses")),
            NextAction::ContinueAndExecute,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for CountingModel {
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("aggregated".to_string())
        }
    }

    #[tokio::test]
    async fn missing_synthesis_stops_the_run() {
        let llm = Arc::new(CountingModel::default());
        let task = AggregationTask::new(llm.clone(), Arc::new(PromptSet::builtin().unwrap()));
        let context = Context::new();
        context
            .set(session_keys::USER_QUERY, "Find the address of {company}".to_string())
            .await;
        context.set(session_keys::SUBJECT_COUNT, 3usize).await;
        context
            .set(
                session_keys::PER_SUBJECT_SYNTHESES,
                vec!["Google: 1600 Amphitheatre Parkway".to_string(), "Meta: 1 Hacker Way".to_string()],
            )
            .await;

        assert!(task.run(context.clone()).await.is_err());
        assert_eq!(
            context
                .get::<PipelineError>(session_keys::PIPELINE_ERROR)
                .await,
            Some(PipelineError::SynthesisCountMismatch {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(context
            .get::<String>(session_keys::AGGREGATED_SYNTHESIS)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn matching_count_aggregates() {
        let llm = Arc::new(CountingModel::default());
        let task = AggregationTask::new(llm.clone(), Arc::new(PromptSet::builtin().unwrap()));
        let context = Context::new();
        context
            .set(session_keys::USER_QUERY, "Find the address of {company}".to_string())
            .await;
        context.set(session_keys::SUBJECT_COUNT, 1usize).await;
        context
            .set(
                session_keys::PER_SUBJECT_SYNTHESES,
                vec!["Google: 1600 Amphitheatre Parkway".to_string()],
            )
            .await;

        assert!(task.run(context.clone()).await.is_ok());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            context
                .get::<String>(session_keys::AGGREGATED_SYNTHESIS)
                .await
                .as_deref(),
            Some("aggregated")
        );
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, Span};

use crate::{
    error::{PipelineError, Warning},
    lang_graph::{
        prompts::PromptSet,
        session_keys,
        utils::{fail, push_warning, require, session_id},
    },
    llm::{CompletionRequest, LanguageModel},
};

/// Summarises the current subject's search results into one paragraph.
pub struct SnippetExtractionTask {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptSet>,
}

impl SnippetExtractionTask {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<PromptSet>) -> Self {
        Self { llm, prompts }
    }

    async fn extract(&self, query: &str, results: &Map<String, Value>) -> anyhow::Result<String> {
        let results = serde_json::to_string(results)?;
        let messages = self
            .prompts
            .extraction
            .messages(&[("query", query), ("results", &results)]);
        self.llm.complete(&CompletionRequest::text(messages)).await
    }
}

fn unavailable(subject: &str) -> String {
    format!("No information could be retrieved for {subject}.")
}

#[async_trait]
impl Task for SnippetExtractionTask {
    #[instrument(name = "snippet_extraction_task", skip(self, context), fields(session_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let session_id = session_id(&context).await;
        Span::current().record("session_id", &session_id);
        info!("Entering snippet extraction");

        let subjects: Vec<String> = require(&context, session_keys::SUBJECTS).await?;
        let queries: Vec<String> = require(&context, session_keys::SUBJECT_QUERIES).await?;
        let cursor: usize = require(&context, session_keys::SUBJECT_CURSOR).await?;
        let mut syntheses: Vec<String> = context
            .get(session_keys::PER_SUBJECT_SYNTHESES)
            .await
            .unwrap_or_default();

        let index = cursor.saturating_sub(1);
        let (Some(subject), Some(query)) = (subjects.get(index), queries.get(index)) else {
            return Err(fail(
                &context,
                PipelineError::MissingState(format!("search query for subject #{cursor}")),
            )
            .await);
        };

        let results: Option<Map<String, Value>> = context
            .get::<Option<Map<String, Value>>>(session_keys::RAW_SEARCH_RESULT)
            .await
            .flatten();

        let synthesis = match results {
            None => unavailable(subject),
            Some(results) => match self.extract(query, &results).await {
                Ok(synthesis) => synthesis,
                Err(e) => {
                    error!(subject = %subject, error = ?e, "Extraction failed");
                    push_warning(
                        &context,
                        Warning::ExtractionFailed {
                            subject: subject.clone(),
                            reason: format!("{e:#}"),
                        },
                    )
                    .await;
                    unavailable(subject)
                }
            },
        };
        debug!(subject = %subject, %synthesis, "Extracted synthesis");

        syntheses.push(synthesis);
        let collected = syntheses.len();
        context
            .set(session_keys::PER_SUBJECT_SYNTHESES, syntheses)
            .await;

        Ok(TaskResult::new(
            Some(format!("Collected {collected}/{} syntheses", subjects.len())),
            NextAction::ContinueAndExecute,
        ))
    }
}

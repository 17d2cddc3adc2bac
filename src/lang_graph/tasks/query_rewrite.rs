use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use regex::Regex;
use tracing::{debug, info, instrument, Span};

use crate::{
    error::{PipelineError, Stage, Warning},
    lang_graph::{
        prompts::PromptSet,
        session_keys,
        template::QueryTemplate,
        utils::{fail, push_warning, require, session_id},
    },
    llm::{CompletionRequest, LanguageModel},
};

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)modified\s+search").expect("marker pattern is valid"));

/// Query text following the "Modified Search:" marker, without the colon,
/// backticks or emphasis around it.
pub(crate) fn extract_marked_query(response: &str) -> Option<String> {
    let marker = MARKER.find_iter(response).last()?;
    let query = response[marker.end()..]
        .trim_start_matches(|c: char| matches!(c, ':' | '`' | '*') || c.is_whitespace())
        .trim_end_matches(|c: char| c == '`' || c.is_whitespace());
    (!query.is_empty()).then(|| query.to_string())
}

pub struct QueryRewriteTask {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptSet>,
    per_subject: bool,
}

impl QueryRewriteTask {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<PromptSet>, per_subject: bool) -> Self {
        Self {
            llm,
            prompts,
            per_subject,
        }
    }

    /// One rewrite call; returns the raw response and its clean query.
    async fn rewrite(&self, query: &str) -> Result<(String, String), PipelineError> {
        let messages = self.prompts.query_rewrite.messages(&[("query", query)]);
        let response = self
            .llm
            .complete(&CompletionRequest::text(messages))
            .await
            .map_err(|e| PipelineError::LanguageModel {
                stage: Stage::QueryRewrite,
                reason: format!("{e:#}"),
            })?;
        debug!(%response, "Rewriter response");

        match extract_marked_query(&response) {
            Some(clean) => Ok((response, clean)),
            None => Err(PipelineError::MissingMarker { response }),
        }
    }

    /// Rewritten response plus one concrete search query per subject.
    async fn subject_queries(
        &self,
        context: &Context,
        template: &QueryTemplate,
        subjects: &[String],
    ) -> Result<(String, Vec<String>), PipelineError> {
        let first = &subjects[0];

        if self.per_subject && template.has_slot() {
            let mut responses = Vec::with_capacity(subjects.len());
            let mut queries = Vec::with_capacity(subjects.len());
            for subject in subjects {
                let (response, clean) = self.rewrite(&template.render(subject)).await?;
                responses.push(response);
                queries.push(clean);
            }
            return Ok((responses.swap_remove(0), queries));
        }

        let (response, clean) = self.rewrite(&template.render(first)).await?;
        if !template.has_slot() {
            return Ok((response, vec![clean; subjects.len()]));
        }

        let queries = match QueryTemplate::from_literal(&clean, first) {
            Some(rewritten) => subjects.iter().map(|s| rewritten.render(s)).collect(),
            None => {
                push_warning(
                    context,
                    Warning::SubjectNotInRewrittenQuery {
                        subject: first.clone(),
                    },
                )
                .await;
                std::iter::once(clean)
                    .chain(subjects[1..].iter().map(|s| template.render(s)))
                    .collect()
            }
        };
        Ok((response, queries))
    }
}

#[async_trait]
impl Task for QueryRewriteTask {
    #[instrument(name = "query_rewrite_task", skip(self, context), fields(session_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let session_id = session_id(&context).await;
        Span::current().record("session_id", &session_id);
        info!("Entering query rewrite");

        let user_query: String = require(&context, session_keys::USER_QUERY).await?;
        let subjects: Vec<String> = require(&context, session_keys::SUBJECTS).await?;
        if subjects.is_empty() {
            return Err(fail(
                &context,
                PipelineError::InvalidSubjects("no subjects to search for".to_string()),
            )
            .await);
        }

        let template = QueryTemplate::parse(&user_query);
        if !template.has_slot() {
            push_warning(&context, Warning::NoPlaceholder).await;
        }

        let (rewritten, queries) = match self.subject_queries(&context, &template, &subjects).await {
            Ok(result) => result,
            Err(error) => return Err(fail(&context, error).await),
        };
        info!(query = %queries[0], "Query rewritten");

        context.set(session_keys::REWRITTEN_QUERY, rewritten).await;
        context.set(session_keys::SUBJECT_QUERIES, queries).await;
        context.set(session_keys::SUBJECT_CURSOR, 0usize).await;
        context
            .set(session_keys::PER_SUBJECT_SYNTHESES, Vec::<String>::new())
            .await;

        Ok(TaskResult::new(
            Some(format!("Query rewritten for {} subjects", subjects.len())),
            NextAction::ContinueAndExecute,
        ))
    }
}

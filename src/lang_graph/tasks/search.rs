use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use serde_json::{Map, Value};
use tracing::{error, info, instrument, Span};

use crate::{
    error::{PipelineError, Warning},
    lang_graph::{
        session_keys,
        utils::{fail, pretty_log, push_warning, require, session_id},
        SearchLocale,
    },
    search::{clean_search_keys, SearchProvider, SearchRequest},
};

/// Issues the search for the subject under the cursor and advances the cursor.
pub struct SearchTask {
    search: Arc<dyn SearchProvider>,
    locale: SearchLocale,
}

impl SearchTask {
    pub fn new(search: Arc<dyn SearchProvider>, locale: SearchLocale) -> Self {
        Self { search, locale }
    }

    async fn filtered_results(&self, query: &str) -> Result<Map<String, Value>, String> {
        let request = SearchRequest {
            query: query.to_string(),
            language: self.locale.language.clone(),
            country: self.locale.country.clone(),
            search_domain: self.locale.domain.clone(),
        };
        match self.search.search(&request).await {
            Ok(Value::Object(results)) => Ok(clean_search_keys(results)),
            Ok(_) => Err("search response was not a JSON object".to_string()),
            Err(e) => Err(format!("{e:#}")),
        }
    }
}

#[async_trait]
impl Task for SearchTask {
    #[instrument(name = "search_task", skip(self, context), fields(session_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let session_id = session_id(&context).await;
        Span::current().record("session_id", &session_id);

        let subjects: Vec<String> = require(&context, session_keys::SUBJECTS).await?;
        let queries: Vec<String> = require(&context, session_keys::SUBJECT_QUERIES).await?;
        let cursor: usize = context
            .get(session_keys::SUBJECT_CURSOR)
            .await
            .unwrap_or_default();

        let (Some(subject), Some(query)) = (subjects.get(cursor), queries.get(cursor)) else {
            return Err(fail(
                &context,
                PipelineError::MissingState(format!("search query for subject #{}", cursor + 1)),
            )
            .await);
        };
        info!(
            subject = %subject,
            "Entering search {}/{}",
            cursor + 1,
            subjects.len()
        );

        let results = match self.filtered_results(query).await {
            Ok(results) => {
                pretty_log(
                    "Filtered search results:",
                    &serde_json::to_string(&results).unwrap_or_default(),
                );
                Some(results)
            }
            Err(reason) => {
                error!(subject = %subject, %reason, "Search failed");
                push_warning(
                    &context,
                    Warning::SearchFailed {
                        subject: subject.clone(),
                        reason,
                    },
                )
                .await;
                None
            }
        };

        context.set(session_keys::RAW_SEARCH_RESULT, results).await;
        context.set(session_keys::SUBJECT_CURSOR, cursor + 1).await;

        Ok(TaskResult::new(
            Some(format!("Searched {}/{}: {query}", cursor + 1, subjects.len())),
            NextAction::ContinueAndExecute,
        ))
    }
}

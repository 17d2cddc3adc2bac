use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, Span};

use crate::{
    error::{PipelineError, Stage},
    lang_graph::{
        formatting::{self, Record},
        prompts::{Prompt, PromptSet},
        session_keys,
        types::records::SubjectRecords,
        utils::{fail, pretty_log, push_warning, session_id},
    },
    llm::{complete_structured, CompletionRequest, LanguageModel, Message},
    settings::FormatMode,
};

#[derive(Debug, Deserialize, JsonSchema)]
struct RelevantKeys {
    relevant_keys: Vec<String>,
}

/// Asks the model which keys of `json` answer `user_query`. The model is told
/// to pick only keys present in the document; that is not verified here.
pub async fn find_relevant_keys(
    llm: &dyn LanguageModel,
    prompt: &Prompt,
    json: &str,
    user_query: &str,
) -> anyhow::Result<Vec<String>> {
    let messages = prompt.messages(&[("query", user_query), ("json", json)]);
    let keys: RelevantKeys = complete_structured(llm, "relevant_keys", messages).await?;
    Ok(keys.relevant_keys)
}

/// Converts the aggregated answer into the final subject-aligned table.
pub struct SchemaFormatTask {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptSet>,
    mode: FormatMode,
}

impl SchemaFormatTask {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<PromptSet>, mode: FormatMode) -> Self {
        Self { llm, prompts, mode }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, PipelineError> {
        self.llm
            .complete(&request)
            .await
            .map_err(|e| PipelineError::LanguageModel {
                stage: Stage::Formatting,
                reason: format!("{e:#}"),
            })
    }

    /// Per-subject records plus the JSON text shown to the relevance classifier.
    async fn records(
        &self,
        context: &Context,
        messages: Vec<Message>,
        subjects: &[String],
    ) -> Result<(Vec<Record>, String), PipelineError> {
        match self.mode {
            FormatMode::Strict => {
                let request = CompletionRequest::structured::<SubjectRecords>(
                    "subject_records",
                    messages,
                )
                .map_err(|e| PipelineError::LanguageModel {
                    stage: Stage::Formatting,
                    reason: format!("{e:#}"),
                })?;
                let raw = self.complete(request).await?;
                context.set(session_keys::FORMATTED_JSON, raw.clone()).await;

                let parsed: SubjectRecords =
                    serde_json::from_str(&raw).map_err(|e| PipelineError::MalformedJson {
                        reason: e.to_string(),
                        raw: raw.clone(),
                    })?;
                let (records, warnings) = formatting::align_records(subjects, parsed);
                for warning in warnings {
                    push_warning(context, warning).await;
                }
                let json = formatting::records_to_json(subjects, &records).to_string();
                Ok((records, json))
            }
            FormatMode::Freeform => {
                let raw = self.complete(CompletionRequest::json(messages)).await?;
                context.set(session_keys::FORMATTED_JSON, raw.clone()).await;

                let parsed: Value =
                    serde_json::from_str(&raw).map_err(|e| PipelineError::MalformedJson {
                        reason: e.to_string(),
                        raw: raw.clone(),
                    })?;
                let Value::Object(json) = parsed else {
                    return Err(PipelineError::MalformedJson {
                        reason: "top level is not a JSON object".to_string(),
                        raw,
                    });
                };
                debug!(shape = ?formatting::detect_shape(&json, subjects), "Formatter answer shape");
                let (records, warnings) = formatting::information_list(json, subjects)?;
                for warning in warnings {
                    push_warning(context, warning).await;
                }
                Ok((records, raw))
            }
        }
    }

    async fn format(&self, context: &Context) -> Result<usize, PipelineError> {
        let user_query: String = context
            .get(session_keys::USER_QUERY)
            .await
            .ok_or_else(|| PipelineError::MissingState(session_keys::USER_QUERY.to_string()))?;
        let subjects: Vec<String> = context
            .get(session_keys::SUBJECTS)
            .await
            .ok_or_else(|| PipelineError::MissingState(session_keys::SUBJECTS.to_string()))?;
        let synthesis: String = context
            .get(session_keys::AGGREGATED_SYNTHESIS)
            .await
            .ok_or_else(|| {
                PipelineError::MissingState(session_keys::AGGREGATED_SYNTHESIS.to_string())
            })?;

        let subject_list = subjects.join(", ");
        let messages = self.prompts.formatting.messages(
            self.mode == FormatMode::Strict,
            &[
                ("query", &user_query),
                ("synthesis", &synthesis),
                ("subjects", &subject_list),
            ],
        );

        let (records, json) = self.records(context, messages, &subjects).await?;
        pretty_log("Formatted answer:", &json);

        let keys = find_relevant_keys(
            self.llm.as_ref(),
            &self.prompts.relevance,
            &json,
            &user_query,
        )
        .await
        .map_err(|e| PipelineError::LanguageModel {
            stage: Stage::Relevance,
            reason: format!("{e:#}"),
        })?;
        let fields = formatting::dedupe_keys(keys);
        info!(?fields, "Relevant fields selected");

        let (table, warnings) = formatting::build_table(&subjects, records, &fields);
        for warning in warnings {
            push_warning(context, warning).await;
        }

        let columns = table.columns.len();
        context.set(session_keys::RELEVANT_FIELDS, fields).await;
        context.set(session_keys::FINAL_RESULT, table).await;
        Ok(columns)
    }
}

#[async_trait]
impl Task for SchemaFormatTask {
    #[instrument(name = "schema_format_task", skip(self, context), fields(session_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let session_id = session_id(&context).await;
        Span::current().record("session_id", &session_id);
        info!(mode = ?self.mode, "Entering schema formatting");

        match self.format(&context).await {
            Ok(columns) => Ok(TaskResult::new(
                Some(format!("Result table built with {columns} fields")),
                NextAction::End,
            )),
            Err(error) => Err(fail(&context, error).await),
        }
    }
}

pub mod formatting;
pub mod graph;
pub mod prompts;
pub mod session_keys;
pub mod tasks;
pub mod template;
pub mod types;
pub mod utils;

use std::{any::type_name, sync::Arc};

use graph_flow::{
    ExecutionStatus, FlowRunner, Graph, InMemorySessionStorage, Session, SessionStorage,
};
use tracing::{info, warn};

use crate::{
    error::PipelineError,
    lang_graph::{
        prompts::PromptSet,
        tasks::query_rewrite::QueryRewriteTask,
        types::{response::SearchOutcome, state::PipelineState},
    },
    llm::{ollama::OllamaChat, openai::OpenAiChat, LanguageModel},
    search::{SearchProvider, SerpApiClient},
    settings::{FormatMode, LlmProvider, Settings},
};

/// Most subjects a single run accepts.
pub const MAX_SUBJECTS: usize = 5;

/// Locale parameters sent with every search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLocale {
    pub language: String,
    pub country: String,
    pub domain: String,
}

impl Default for SearchLocale {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            country: "us".to_string(),
            domain: "google.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Rewrite the query separately for each subject instead of once.
    pub rewrite_per_subject: bool,
    pub format_mode: FormatMode,
    pub locale: SearchLocale,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            rewrite_per_subject: settings.pipeline.rewrite_per_subject,
            format_mode: settings.pipeline.format_mode,
            locale: SearchLocale {
                language: settings.search.language.clone(),
                country: settings.search.country.clone(),
                domain: settings.search.domain.clone(),
            },
        }
    }
}

/// Looks up the same facts for a fixed, ordered list of subjects.
///
/// All per-run state lives in the run's session, so one agent can serve
/// several `invoke` calls at once.
pub struct SearchAgent {
    subjects: Vec<String>,
    graph: Arc<Graph>,
}

impl SearchAgent {
    pub fn new(
        subjects: Vec<String>,
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        prompts: PromptSet,
        options: &PipelineOptions,
    ) -> Result<Self, PipelineError> {
        validate_subjects(&subjects)?;
        let graph = graph::build_search_graph(llm, search, Arc::new(prompts), options);
        Ok(Self { subjects, graph })
    }

    /// Wires the configured language model, SerpApi and prompt set.
    pub fn from_settings(subjects: Vec<String>, settings: &Settings) -> anyhow::Result<Self> {
        let llm: Arc<dyn LanguageModel> = match settings.llm.provider {
            LlmProvider::OpenAi => Arc::new(OpenAiChat::new(&settings.llm)?),
            LlmProvider::Ollama => Arc::new(OllamaChat::new(&settings.llm)),
        };
        let search = Arc::new(SerpApiClient::new(&settings.search)?);
        let prompts = match &settings.pipeline.prompts_path {
            Some(path) => PromptSet::from_file(path)?,
            None => PromptSet::builtin()?,
        };
        info!(version = %prompts.version, "Prompt set loaded");

        let options = PipelineOptions::from_settings(settings);
        Ok(Self::new(subjects, llm, search, prompts, &options)?)
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Runs the whole pipeline for `user_query` and returns the result table.
    pub async fn invoke(&self, user_query: &str) -> Result<SearchOutcome, PipelineError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session =
            Session::new_from_task(session_id.clone(), type_name::<QueryRewriteTask>());
        let context = session.context.clone();

        context
            .set(session_keys::SESSION_ID, session_id.clone())
            .await;
        context
            .set(session_keys::USER_QUERY, user_query.to_string())
            .await;
        context
            .set(session_keys::SUBJECTS, self.subjects.clone())
            .await;
        context
            .set(session_keys::SUBJECT_COUNT, self.subjects.len())
            .await;
        context.set(session_keys::SUBJECT_CURSOR, 0usize).await;

        let session_storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        session_storage
            .save(session)
            .await
            .map_err(|e| PipelineError::Graph(e.to_string()))?;

        info!(%session_id, subjects = self.subjects.len(), "Starting search run");
        let flow_runner = FlowRunner::new(self.graph.clone(), session_storage.clone());

        loop {
            let result = match flow_runner.run(&session_id).await {
                Ok(result) => result,
                Err(e) => {
                    let context = stored_context(session_storage.as_ref(), &session_id, context).await;
                    return Err(recorded_error(&context, e.to_string()).await);
                }
            };

            match result.status {
                ExecutionStatus::Completed => break,
                ExecutionStatus::Paused { .. } => continue,
                ExecutionStatus::WaitingForInput => {
                    return Err(PipelineError::Graph(
                        "workflow unexpectedly asked for input".to_string(),
                    ));
                }
                ExecutionStatus::Error(message) => {
                    let context = stored_context(session_storage.as_ref(), &session_id, context).await;
                    return Err(recorded_error(&context, message).await);
                }
            }
        }

        let context = stored_context(session_storage.as_ref(), &session_id, context).await;
        let table = context
            .get(session_keys::FINAL_RESULT)
            .await
            .ok_or_else(|| PipelineError::MissingState(session_keys::FINAL_RESULT.to_string()))?;
        let state = PipelineState::from_context(&context).await;
        for warning in &state.warnings {
            warn!(%session_id, %warning, "Run finished with a warning");
        }
        info!(%session_id, "Search run finished");

        Ok(SearchOutcome { table, state })
    }
}

/// Context of the session as last saved by the runner.
async fn stored_context(
    storage: &dyn SessionStorage,
    session_id: &str,
    fallback: graph_flow::Context,
) -> graph_flow::Context {
    match storage.get(session_id).await {
        Ok(Some(session)) => session.context,
        _ => fallback,
    }
}

/// The typed error a task recorded, or the engine's message when none was.
async fn recorded_error(context: &graph_flow::Context, message: String) -> PipelineError {
    context
        .get::<PipelineError>(session_keys::PIPELINE_ERROR)
        .await
        .unwrap_or(PipelineError::Graph(message))
}

fn validate_subjects(subjects: &[String]) -> Result<(), PipelineError> {
    if subjects.is_empty() {
        return Err(PipelineError::InvalidSubjects(
            "at least one subject is required".to_string(),
        ));
    }
    if subjects.len() > MAX_SUBJECTS {
        return Err(PipelineError::InvalidSubjects(format!(
            "at most {MAX_SUBJECTS} subjects are supported, got {}",
            subjects.len()
        )));
    }
    if let Some(position) = subjects.iter().position(|s| s.trim().is_empty()) {
        return Err(PipelineError::InvalidSubjects(format!(
            "subject #{} is blank",
            position + 1
        )));
    }
    for (position, subject) in subjects.iter().enumerate().skip(1) {
        if subjects[..position].iter().any(|s| s.trim() == subject.trim()) {
            return Err(PipelineError::InvalidSubjects(format!(
                "subject {:?} is listed more than once",
                subject.trim()
            )));
        }
    }
    Ok(())
}

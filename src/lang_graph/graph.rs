use std::sync::Arc;

use graph_flow::{Context, GraphBuilder, Task};

use crate::{
    lang_graph::{
        prompts::PromptSet,
        session_keys,
        tasks::{aggregation, query_rewrite, schema_format, search, snippet_extraction},
        PipelineOptions,
    },
    llm::LanguageModel,
    search::SearchProvider,
};

/// Whether every subject has been searched and extracted.
pub fn loop_finished(ctx: &Context) -> bool {
    let cursor = ctx
        .get_sync::<usize>(session_keys::SUBJECT_CURSOR)
        .unwrap_or(0);
    let count = ctx
        .get_sync::<usize>(session_keys::SUBJECT_COUNT)
        .unwrap_or(0);
    cursor >= count
}

/// query_rewrite -> search -> snippet_extraction -> (search again | aggregation) -> schema_format
pub fn build_search_graph(
    llm: Arc<dyn LanguageModel>,
    search_provider: Arc<dyn SearchProvider>,
    prompts: Arc<PromptSet>,
    options: &PipelineOptions,
) -> Arc<graph_flow::Graph> {
    let query_rewrite = Arc::new(query_rewrite::QueryRewriteTask::new(
        llm.clone(),
        prompts.clone(),
        options.rewrite_per_subject,
    ));
    let search = Arc::new(search::SearchTask::new(
        search_provider,
        options.locale.clone(),
    ));
    let snippet_extraction = Arc::new(snippet_extraction::SnippetExtractionTask::new(
        llm.clone(),
        prompts.clone(),
    ));
    let aggregation = Arc::new(aggregation::AggregationTask::new(
        llm.clone(),
        prompts.clone(),
    ));
    let schema_format = Arc::new(schema_format::SchemaFormatTask::new(
        llm,
        prompts,
        options.format_mode,
    ));

    let graph = GraphBuilder::new("subject_search_workflow")
        .add_task(query_rewrite.clone())
        .add_task(search.clone())
        .add_task(snippet_extraction.clone())
        .add_task(aggregation.clone())
        .add_task(schema_format.clone())
        .add_edge(query_rewrite.id(), search.id())
        .add_edge(search.id(), snippet_extraction.id())
        .add_conditional_edge(
            snippet_extraction.id(),
            loop_finished,
            aggregation.id(),
            search.id(),
        )
        .add_edge(aggregation.id(), schema_format.id())
        .build();

    Arc::new(graph)
}

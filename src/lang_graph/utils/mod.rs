use graph_flow::{Context, GraphError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    error::{PipelineError, Warning},
    lang_graph::session_keys,
};

/// Logs `data` pretty-printed when it is JSON, verbatim otherwise.
pub fn pretty_log(message: &str, data: &str) {
    match serde_json::from_str::<Value>(data) {
        Ok(parsed) => info!(
            "{message} {}",
            serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| data.to_string())
        ),
        Err(_) => info!("{message} {data}"),
    }
}

/// Records `error` for the caller and converts it for the graph engine.
pub(crate) async fn fail(context: &Context, error: PipelineError) -> GraphError {
    error!(%error, "Pipeline stage failed");
    context.set(session_keys::PIPELINE_ERROR, error.clone()).await;
    GraphError::TaskExecutionFailed(error.to_string())
}

/// Reads a value an earlier stage must have written.
pub(crate) async fn require<T: DeserializeOwned>(
    context: &Context,
    key: &str,
) -> graph_flow::Result<T> {
    match context.get::<T>(key).await {
        Some(value) => Ok(value),
        None => Err(fail(context, PipelineError::MissingState(key.to_string())).await),
    }
}

pub(crate) async fn push_warning(context: &Context, warning: Warning) {
    warn!(%warning, "Pipeline degraded");
    let mut warnings: Vec<Warning> = context
        .get(session_keys::WARNINGS)
        .await
        .unwrap_or_default();
    warnings.push(warning);
    context.set(session_keys::WARNINGS, warnings).await;
}

pub(crate) async fn session_id(context: &Context) -> String {
    context
        .get::<String>(session_keys::SESSION_ID)
        .await
        .unwrap_or_else(|| "unknown".to_string())
}

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage a language-model call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    QueryRewrite,
    Extraction,
    Aggregation,
    Formatting,
    Relevance,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::QueryRewrite => "query rewrite",
            Stage::Extraction => "snippet extraction",
            Stage::Aggregation => "cross-subject aggregation",
            Stage::Formatting => "schema formatting",
            Stage::Relevance => "key relevance",
        };
        f.write_str(name)
    }
}

/// Failures that end a run without a result table.
///
/// Stored in the session context by the failing task so the caller gets the
/// typed error back instead of the graph engine's string.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineError {
    #[error("invalid subject list: {0}")]
    InvalidSubjects(String),

    #[error("rewritten query has no \"Modified Search:\" marker: {response}")]
    MissingMarker { response: String },

    #[error("expected {expected} per-subject syntheses before aggregation, found {found}")]
    SynthesisCountMismatch { expected: usize, found: usize },

    #[error("formatter returned malformed JSON ({reason}): {raw}")]
    MalformedJson { reason: String, raw: String },

    #[error("formatter returned an unusable JSON shape: {0}")]
    UnexpectedShape(String),

    #[error("language model failed during {stage}: {reason}")]
    LanguageModel { stage: Stage, reason: String },

    #[error("pipeline state is missing {0}")]
    MissingState(String),

    #[error("graph execution failed: {0}")]
    Graph(String),
}

/// Degradations recorded during a run that still produced a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The user query had no `{placeholder}`, so every subject used the same query.
    NoPlaceholder,
    /// The rewritten query lost the first subject's text; the original template was used instead.
    SubjectNotInRewrittenQuery { subject: String },
    SearchFailed { subject: String, reason: String },
    ExtractionFailed { subject: String, reason: String },
    /// The formatter produced a different number of per-subject records than subjects.
    RecordCountMismatch { expected: usize, found: usize },
    /// A relevant key was not present in any subject record.
    UnknownField { field: String },
    /// A per-subject entry of a free-form answer was not an object, so that
    /// subject's fields are empty.
    MalformedRecord { index: usize, found: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NoPlaceholder => {
                write!(f, "query has no placeholder; all subjects share one query")
            }
            Warning::SubjectNotInRewrittenQuery { subject } => write!(
                f,
                "rewritten query does not mention {subject:?}; fell back to the original query"
            ),
            Warning::SearchFailed { subject, reason } => {
                write!(f, "search for {subject:?} failed: {reason}")
            }
            Warning::ExtractionFailed { subject, reason } => {
                write!(f, "extraction for {subject:?} failed: {reason}")
            }
            Warning::RecordCountMismatch { expected, found } => {
                write!(f, "expected {expected} subject records, formatter produced {found}")
            }
            Warning::UnknownField { field } => {
                write!(f, "relevant field {field:?} is absent from every record")
            }
            Warning::MalformedRecord { index, found } => write!(
                f,
                "record #{} is {found} instead of an object; its fields are left empty",
                index + 1
            ),
        }
    }
}

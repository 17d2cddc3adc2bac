pub mod error;
pub mod export;
pub mod lang_graph;
pub mod llm;
pub mod search;
pub mod settings;

pub use error::{PipelineError, Stage, Warning};
pub use lang_graph::{
    types::{
        response::{ResultColumn, ResultTable, SearchOutcome},
        state::PipelineState,
    },
    PipelineOptions, SearchAgent,
};

pub(crate) mod aggregation;
pub(crate) mod query_rewrite;
pub(crate) mod schema_format;
pub(crate) mod search;
pub(crate) mod snippet_extraction;

pub use schema_format::find_relevant_keys;

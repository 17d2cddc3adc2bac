// Keys of the per-run state kept in the session context.
pub const SESSION_ID: &str = "session_id";
pub const USER_QUERY: &str = "user_query";
pub const SUBJECTS: &str = "subjects";
pub const SUBJECT_COUNT: &str = "subject_count";
pub const REWRITTEN_QUERY: &str = "rewritten_query";
pub const SUBJECT_QUERIES: &str = "subject_queries"; // one search query per subject
pub const SUBJECT_CURSOR: &str = "subject_cursor";
pub const RAW_SEARCH_RESULT: &str = "raw_search_result";
pub const PER_SUBJECT_SYNTHESES: &str = "per_subject_syntheses";
pub const AGGREGATED_SYNTHESIS: &str = "aggregated_synthesis";
pub const FORMATTED_JSON: &str = "formatted_json";
pub const RELEVANT_FIELDS: &str = "relevant_fields";
pub const FINAL_RESULT: &str = "final_result";
pub const WARNINGS: &str = "warnings";
pub const PIPELINE_ERROR: &str = "pipeline_error";

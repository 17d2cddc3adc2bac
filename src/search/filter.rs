use serde_json::{Map, Value};

/// Top-level response sections that carry no facts about the query.
pub const BOILERPLATE_KEYS: [&str; 12] = [
    "search_metadata",
    "search_parameters",
    "search_information",
    "local_map",
    "inline_images",
    "related_searches",
    "dmca_messages",
    "pagination",
    "serpapi_pagination",
    "filters",
    "top_stories",
    "ai_overview",
];

/// Drops the boilerplate sections from a search response, keeping every other
/// top-level entry in its original order. Nested values are left untouched.
pub fn clean_search_keys(results: Map<String, Value>) -> Map<String, Value> {
    results
        .into_iter()
        .filter(|(key, _)| !BOILERPLATE_KEYS.contains(&key.as_str()))
        .collect()
}

//! Web-search boundary.

pub mod filter;
pub mod serpapi;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use filter::clean_search_keys;
pub use serpapi::SerpApiClient;

/// One search call. Locale fields are fixed per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub language: String,
    pub country: String,
    pub search_domain: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns the provider's raw response document.
    async fn search(&self, request: &SearchRequest) -> Result<Value>;
}

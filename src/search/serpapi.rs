use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::{SearchProvider, SearchRequest};
use crate::settings::SearchSettings;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Google results through SerpApi's JSON endpoint.
pub struct SerpApiClient {
    client: Client,
    endpoint: String,
    engine: String,
    api_key: String,
}

impl SerpApiClient {
    pub fn new(settings: &SearchSettings) -> Result<Self> {
        let Some(api_key) = settings.api_key.clone() else {
            bail!("No SerpApi key configured; set search.api_key or SERPAPI_API_KEY");
        };
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            engine: settings.engine.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn search(&self, request: &SearchRequest) -> Result<Value> {
        debug!(query = %request.query, "Sending search request");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", self.engine.as_str()),
                ("q", request.query.as_str()),
                ("hl", request.language.as_str()),
                ("gl", request.country.as_str()),
                ("google_domain", request.search_domain.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Search API error {status}: {body}");
        }

        let results: Value = response
            .json()
            .await
            .context("Failed to parse search response")?;

        if let Some(message) = results.get("error").and_then(Value::as_str) {
            bail!("Search API reported an error: {message}");
        }

        info!(
            sections = results.as_object().map_or(0, serde_json::Map::len),
            "Search response received"
        );
        Ok(results)
    }
}

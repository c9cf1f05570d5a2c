use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::engine::capability::{SearchHit, SearchProvider, SearchResponse};
use crate::error::SearchError;
use crate::sanitize::truncate_chars;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

/// Tavily web search (`POST {endpoint}/search`).
pub struct TavilySearch {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    max_results: u32,
    search_depth: String,
}

impl TavilySearch {
    pub fn new(config: &SearchConfig, api_key: SecretString) -> Result<Self, SearchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            max_results: config.max_results,
            search_depth: config.search_depth.clone(),
        })
    }

    /// Builds the provider when a key is available, `Ok(None)` otherwise.
    pub fn from_config(config: &SearchConfig) -> Result<Option<Self>, SearchError> {
        let key = config
            .key_source()
            .resolve()
            .map_err(|e| SearchError::NotConfigured(e.to_string()))?;
        key.map(|key| Self::new(config, key)).transpose()
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        let request = TavilyRequest {
            api_key: self.api_key.expose_secret(),
            query,
            max_results: self.max_results,
            search_depth: &self.search_depth,
        };

        let response = self
            .client
            .post(format!("{}/search", self.endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status,
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS).to_string(),
            });
        }

        let parsed: TavilyResponse = response.json().await?;
        tracing::debug!(results = parsed.results.len(), "Tavily search complete");

        Ok(SearchResponse {
            query: query.to_string(),
            results: parsed
                .results
                .into_iter()
                .map(|r| SearchHit {
                    title: r.title,
                    url: r.url,
                    content: r.content,
                    score: r.score,
                })
                .collect(),
            answer: parsed.answer.unwrap_or_default(),
        })
    }
}

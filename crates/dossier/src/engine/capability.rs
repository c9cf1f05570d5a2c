//! The web search capability handed to an analysis engine.
//!
//! Holding a [`SearchCapability`] is the permission to search: the
//! orchestrator only builds one when the job grants search, and the engine
//! decides whether to use it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    #[serde(default)]
    pub answer: String,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError>;
}

type Observer = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct CallLog {
    calls: u32,
    failures: u32,
    payloads: Vec<serde_json::Value>,
}

#[derive(Clone)]
pub struct SearchCapability {
    provider: Arc<dyn SearchProvider>,
    geography: Option<String>,
    on_first_call: Option<Observer>,
    log: Arc<Mutex<CallLog>>,
}

impl SearchCapability {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            geography: None,
            on_first_call: None,
            log: Arc::new(Mutex::new(CallLog::default())),
        }
    }

    /// Appends `geography` to every query.
    pub fn with_geography(mut self, geography: &str) -> Self {
        let geography = geography.trim();
        if !geography.is_empty() {
            self.geography = Some(geography.to_string());
        }
        self
    }

    /// Registers a callback run once, before the first search goes out.
    pub fn on_first_call(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_first_call = Some(Arc::new(observer));
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        let query = match &self.geography {
            Some(geo) => format!("{} {}", query.trim(), geo),
            None => query.trim().to_string(),
        };

        let first = {
            let mut log = self.lock();
            log.calls += 1;
            log.calls == 1
        };
        if first {
            if let Some(observer) = &self.on_first_call {
                observer();
            }
        }

        let result = self.provider.search(&query).await;
        let mut log = self.lock();
        match &result {
            Ok(response) => {
                tracing::info!(
                    provider = self.provider.name(),
                    results = response.results.len(),
                    "Search returned results"
                );
                log.payloads
                    .push(serde_json::to_value(response).unwrap_or(serde_json::Value::Null));
            }
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "Search failed");
                log.failures += 1;
            }
        }
        result
    }

    pub fn call_count(&self) -> u32 {
        self.lock().calls
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Raw responses of every successful call, in call order.
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.lock().payloads.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CallLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Search call log lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Echo;

    #[async_trait]
    impl SearchProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
            if query.contains("fail") {
                return Err(SearchError::Failed("boom".to_string()));
            }
            Ok(SearchResponse {
                query: query.to_string(),
                results: vec![SearchHit {
                    title: "Result".to_string(),
                    url: "https://example.com/r".to_string(),
                    content: "body".to_string(),
                    score: 0.9,
                }],
                answer: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_observer_fires_once() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let capability = SearchCapability::new(Arc::new(Echo)).on_first_call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        capability.search("solar panels").await.unwrap();
        capability.search("inverters").await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(capability.call_count(), 2);
        assert_eq!(capability.payloads().len(), 2);
    }

    #[tokio::test]
    async fn test_geography_appended() {
        let capability = SearchCapability::new(Arc::new(Echo)).with_geography(" Brazil ");
        let response = capability.search("solar market").await.unwrap();
        assert_eq!(response.query, "solar market Brazil");
    }

    #[tokio::test]
    async fn test_failures_counted_not_recorded() {
        let capability = SearchCapability::new(Arc::new(Echo));
        assert!(capability.search("please fail").await.is_err());
        assert_eq!(capability.call_count(), 1);
        assert_eq!(capability.failure_count(), 1);
        assert!(capability.payloads().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_log() {
        let capability = SearchCapability::new(Arc::new(Echo));
        let clone = capability.clone();
        clone.search("x").await.unwrap();
        assert_eq!(capability.call_count(), 1);
    }
}

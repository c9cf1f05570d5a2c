//! Analysis engine adapter.
//!
//! An [`AnalysisEngine`] turns extracted text and a job configuration into a
//! markdown report with references. Web search reaches it only as a
//! [`SearchCapability`] granted by the orchestrator.

pub mod capability;
pub mod openai;
pub mod planner;
pub mod prompts;
pub mod tavily;

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::worker::{AnalysisMode, JobConfig};

pub use capability::{SearchCapability, SearchHit, SearchProvider, SearchResponse};
pub use openai::OpenAiEngine;
pub use planner::{plan_research, ResearchPlan};
pub use tavily::TavilySearch;

static RE_MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\((https?://[^)\s]+)\)").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

pub struct AnalysisRequest {
    pub job_id: String,
    pub mode: AnalysisMode,
    pub config: JobConfig,
    /// Empty for topic-only runs.
    pub document_text: String,
    pub plan: Option<ResearchPlan>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisOutput {
    pub markdown: String,
    pub references: Vec<Reference>,
    pub search_payloads: Vec<serde_json::Value>,
    pub reasoning: String,
}

#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the analysis. `search` is `Some` only when the job grants web
    /// search; the engine decides whether to call it.
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        search: Option<&SearchCapability>,
    ) -> Result<AnalysisOutput, EngineError>;
}

/// Drops references with an empty or repeated URL and keeps at most `limit`.
pub fn dedupe_references(references: Vec<Reference>, limit: usize) -> Vec<Reference> {
    let mut seen = HashSet::new();
    references
        .into_iter()
        .filter(|r| !r.url.trim().is_empty())
        .filter(|r| seen.insert(r.url.trim().trim_end_matches('/').to_string()))
        .take(limit)
        .collect()
}

/// `[title](url)` links found in a markdown answer.
pub fn harvest_links(markdown: &str) -> Vec<Reference> {
    RE_MARKDOWN_LINK
        .captures_iter(markdown)
        .map(|c| Reference {
            title: c[1].trim().to_string(),
            url: c[2].to_string(),
            snippet: String::new(),
        })
        .collect()
}

/// One-line summary of how the report was produced.
pub fn reasoning_trace(
    config: &JobConfig,
    model: &str,
    plan: Option<&ResearchPlan>,
    search_calls: u32,
) -> String {
    let (strategies, topics) = match plan {
        Some(plan) => (
            plan.strategies.len(),
            plan.focus_topics
                .iter()
                .take(3)
                .map(|t| crate::sanitize::truncate_chars(t, 40).to_string())
                .collect::<Vec<_>>()
                .join(" | "),
        ),
        None => (0, String::new()),
    };
    format!(
        "Style: {}, Domain: {}, Model: {}, Strategies: {}, Topics: {}, Search calls: {}",
        config.report_style, config.domain, model, strategies, topics, search_calls
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(url: &str) -> Reference {
        Reference {
            title: format!("T {}", url),
            url: url.to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn test_dedupe_and_clamp() {
        let refs = vec![
            reference("https://a.com"),
            reference("https://a.com/"),
            reference(""),
            reference("https://b.com"),
            reference("https://c.com"),
        ];
        let kept = dedupe_references(refs, 2);
        let urls: Vec<_> = kept.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com", "https://b.com"]);
    }

    #[test]
    fn test_harvest_links() {
        let md = "See [Solar Outlook 2026](https://iea.org/solar) and [local](./x) plus \
                  [Bloomberg](http://bloomberg.com/a?b=c).";
        let links = harvest_links(md);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].title, "Solar Outlook 2026");
        assert_eq!(links[1].url, "http://bloomberg.com/a?b=c");
    }

    #[test]
    fn test_reasoning_trace_format() {
        let config = JobConfig::default();
        let trace = reasoning_trace(&config, "gpt-4o", None, 2);
        assert_eq!(
            trace,
            "Style: analytical, Domain: other, Model: gpt-4o, Strategies: 0, Topics: , Search calls: 2"
        );
    }
}

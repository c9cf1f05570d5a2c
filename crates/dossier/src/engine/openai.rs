//! OpenAI-compatible chat completions engine with a `web_search` tool.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::EngineConfig;
use crate::engine::capability::SearchCapability;
use crate::engine::{
    dedupe_references, harvest_links, prompts, reasoning_trace, AnalysisEngine, AnalysisOutput,
    AnalysisRequest, Reference,
};
use crate::error::EngineError;
use crate::sanitize::{redact_url, truncate_chars};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_ERROR_BODY_CHARS: usize = 300;
const TOOL_CONTENT_CHARS: usize = 500;
const SNIPPET_CHARS: usize = 300;
const SEARCH_TOOL: &str = "web_search";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            ..Self::default()
        }
    }

    fn tool_result(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_call_id: Some(call_id.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

/// Sends one chat completion round.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<ChatMessage, EngineError>;
}

pub struct HttpTransport {
    client: Client,
    url: String,
    api_key: SecretString,
}

impl HttpTransport {
    pub fn new(endpoint: &str, api_key: SecretString) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<ChatMessage, EngineError> {
        tracing::debug!(url = %redact_url(&self.url), messages = request.messages.len(), "Chat completion request");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status,
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS).to_string(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| EngineError::InvalidResponse("response has no choices".to_string()))
    }
}

pub struct OpenAiEngine {
    transport: Box<dyn ChatTransport>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_tool_rounds: u32,
    brand: String,
}

impl OpenAiEngine {
    pub fn from_config(config: &EngineConfig, brand: &str) -> Result<Self, EngineError> {
        let key = config
            .key_source()
            .resolve()
            .map_err(|e| EngineError::NotConfigured(e.to_string()))?
            .ok_or_else(|| EngineError::NotConfigured("no API key configured".to_string()))?;
        let transport = HttpTransport::new(&config.endpoint, key)?;
        Ok(Self::with_transport(Box::new(transport), config, brand))
    }

    pub fn with_transport(
        transport: Box<dyn ChatTransport>,
        config: &EngineConfig,
        brand: &str,
    ) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_tool_rounds: config.max_tool_rounds,
            brand: brand.to_string(),
        }
    }

    fn tool_definitions() -> serde_json::Value {
        json!([{
            "type": "function",
            "function": {
                "name": SEARCH_TOOL,
                "description": "Search the web for current information, market data and references.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Focused search query"
                        }
                    },
                    "required": ["query"]
                }
            }
        }])
    }

    async fn run_tool(
        &self,
        call: &ToolCall,
        search: &SearchCapability,
        collected: &mut Vec<Reference>,
    ) -> String {
        if call.function.name != SEARCH_TOOL {
            return json!({ "error": format!("unknown tool '{}'", call.function.name) })
                .to_string();
        }

        let args: SearchArgs = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(e) => return json!({ "error": format!("invalid arguments: {}", e) }).to_string(),
        };

        match search.search(&args.query).await {
            Ok(response) => {
                let results: Vec<serde_json::Value> = response
                    .results
                    .iter()
                    .map(|hit| {
                        json!({
                            "title": hit.title,
                            "url": hit.url,
                            "content": truncate_chars(&hit.content, TOOL_CONTENT_CHARS),
                        })
                    })
                    .collect();
                collected.extend(response.results.iter().map(|hit| Reference {
                    title: hit.title.clone(),
                    url: hit.url.clone(),
                    snippet: truncate_chars(&hit.content, SNIPPET_CHARS).to_string(),
                }));
                json!({ "query": response.query, "answer": response.answer, "results": results })
                    .to_string()
            }
            Err(e) => {
                // Search failures are reported to the model, not raised.
                tracing::warn!(error = %e, "SearchFailure during analysis");
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }
}

#[async_trait]
impl AnalysisEngine for OpenAiEngine {
    fn name(&self) -> &str {
        "openai"
    }

    async fn analyze(
        &self,
        request: &AnalysisRequest,
        search: Option<&SearchCapability>,
    ) -> Result<AnalysisOutput, EngineError> {
        let config = &request.config;
        let mut messages = vec![
            ChatMessage::text(
                "system",
                prompts::system_prompt(request.mode, config, search.is_some(), &self.brand),
            ),
            ChatMessage::text(
                "user",
                prompts::user_prompt(
                    request.mode,
                    config,
                    &request.document_text,
                    request.plan.as_ref(),
                ),
            ),
        ];
        let mut collected = Vec::new();

        for round in 0..=self.max_tool_rounds {
            let offer_tools = search.is_some() && round < self.max_tool_rounds;
            let chat = ChatRequest {
                model: &self.model,
                messages: &messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: offer_tools.then(Self::tool_definitions),
            };
            let reply = self.transport.complete(&chat).await?;

            let search = match search {
                Some(search) if offer_tools && !reply.tool_calls.is_empty() => search,
                _ => {
                    let markdown = reply.content.unwrap_or_default().trim().to_string();
                    if markdown.is_empty() {
                        return Err(EngineError::EmptyReport);
                    }
                    let references = if collected.is_empty() {
                        harvest_links(&markdown)
                    } else {
                        collected
                    };
                    let calls = search.map(|s| s.call_count()).unwrap_or(0);
                    tracing::info!(round, search_calls = calls, "Engine produced final answer");
                    return Ok(AnalysisOutput {
                        references: dedupe_references(references, config.source_count as usize),
                        search_payloads: search.map(|s| s.payloads()).unwrap_or_default(),
                        reasoning: reasoning_trace(config, &self.model, request.plan.as_ref(), calls),
                        markdown,
                    });
                }
            };

            tracing::debug!(round, calls = reply.tool_calls.len(), "Engine requested tools");
            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in &calls {
                let content = self.run_tool(call, search, &mut collected).await;
                messages.push(ChatMessage::tool_result(&call.id, content));
            }
        }

        Err(EngineError::InvalidResponse(format!(
            "no final answer after {} rounds",
            self.max_tool_rounds + 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::capability::{SearchHit, SearchProvider, SearchResponse};
    use crate::error::SearchError;
    use crate::secrets::KeySource;
    use crate::worker::{AnalysisMode, JobConfig};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned replies and records whether tools were offered.
    struct Scripted {
        replies: Mutex<VecDeque<ChatMessage>>,
        offered_tools: Arc<Mutex<Vec<bool>>>,
    }

    impl Scripted {
        fn new(replies: Vec<ChatMessage>) -> (Self, Arc<Mutex<Vec<bool>>>) {
            let offered = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    replies: Mutex::new(replies.into()),
                    offered_tools: offered.clone(),
                },
                offered,
            )
        }
    }

    #[async_trait]
    impl ChatTransport for Scripted {
        async fn complete(&self, request: &ChatRequest<'_>) -> Result<ChatMessage, EngineError> {
            self.offered_tools
                .lock()
                .unwrap()
                .push(request.tools.is_some());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| EngineError::InvalidResponse("script exhausted".to_string()))
        }
    }

    struct FixedSearch {
        fail: bool,
    }

    #[async_trait]
    impl SearchProvider for FixedSearch {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
            if self.fail {
                return Err(SearchError::Failed("quota exceeded".to_string()));
            }
            Ok(SearchResponse {
                query: query.to_string(),
                results: (1..=3)
                    .map(|i| SearchHit {
                        title: format!("Source {}", i),
                        url: format!("https://example.com/{}", i),
                        content: "Solar installations grew 30%.".to_string(),
                        score: 0.5,
                    })
                    .collect(),
                answer: String::new(),
            })
        }
    }

    fn tool_call(query: &str) -> ChatMessage {
        ChatMessage {
            role: "assistant".to_string(),
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: SEARCH_TOOL.to_string(),
                    arguments: json!({ "query": query }).to_string(),
                },
            }],
            ..ChatMessage::default()
        }
    }

    fn answer(text: &str) -> ChatMessage {
        ChatMessage::text("assistant", text.to_string())
    }

    fn request(source_count: u32) -> AnalysisRequest {
        AnalysisRequest {
            job_id: "j1".to_string(),
            mode: AnalysisMode::FreeForm,
            config: JobConfig {
                objective: "market trends in solar panels".to_string(),
                source_count,
                ..JobConfig::default()
            },
            document_text: String::new(),
            plan: None,
        }
    }

    fn engine(replies: Vec<ChatMessage>, rounds: u32) -> (OpenAiEngine, Arc<Mutex<Vec<bool>>>) {
        let (transport, offered) = Scripted::new(replies);
        let config = EngineConfig {
            max_tool_rounds: rounds,
            ..EngineConfig::default()
        };
        (
            OpenAiEngine::with_transport(Box::new(transport), &config, "Dossier"),
            offered,
        )
    }

    #[tokio::test]
    async fn test_search_results_become_references() {
        let (engine, offered) = engine(
            vec![tool_call("solar 2026"), answer("## Findings\nGrowth is strong.")],
            4,
        );
        let capability = SearchCapability::new(Arc::new(FixedSearch { fail: false }));

        let output = engine
            .analyze(&request(2), Some(&capability))
            .await
            .unwrap();

        assert_eq!(output.references.len(), 2);
        assert_eq!(output.references[0].url, "https://example.com/1");
        assert_eq!(output.search_payloads.len(), 1);
        assert!(output.reasoning.contains("Search calls: 1"));
        assert_eq!(*offered.lock().unwrap(), vec![true, true]);
    }

    #[tokio::test]
    async fn test_last_round_withholds_tools() {
        let (engine, offered) = engine(vec![tool_call("q"), answer("Final report")], 1);
        let capability = SearchCapability::new(Arc::new(FixedSearch { fail: false }));

        let output = engine
            .analyze(&request(5), Some(&capability))
            .await
            .unwrap();

        assert_eq!(output.markdown, "Final report");
        assert_eq!(*offered.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_search_failure_is_not_fatal() {
        let (engine, _) = engine(
            vec![
                tool_call("q"),
                answer("Report citing [IEA](https://iea.org/report)."),
            ],
            4,
        );
        let capability = SearchCapability::new(Arc::new(FixedSearch { fail: true }));

        let output = engine
            .analyze(&request(5), Some(&capability))
            .await
            .unwrap();

        assert_eq!(capability.failure_count(), 1);
        assert_eq!(output.references.len(), 1);
        assert_eq!(output.references[0].url, "https://iea.org/report");
        assert!(output.search_payloads.is_empty());
    }

    #[tokio::test]
    async fn test_no_capability_no_tools() {
        let (engine, offered) = engine(vec![answer("Plain analysis")], 4);
        let output = engine.analyze(&request(5), None).await.unwrap();
        assert_eq!(output.markdown, "Plain analysis");
        assert_eq!(*offered.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_empty_answer_is_failure() {
        let (engine, _) = engine(vec![answer("   ")], 4);
        let result = engine.analyze(&request(5), None).await;
        assert!(matches!(result, Err(EngineError::EmptyReport)));
    }

    #[test]
    fn test_response_with_null_content_and_tool_calls() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"c1","type":"function","function":{"name":"web_search","arguments":"{\"query\":\"x\"}"}}]}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let message = &parsed.choices[0].message;
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls[0].function.name, "web_search");
    }

    #[test]
    fn test_request_omits_tools_when_absent() {
        let messages = vec![ChatMessage::text("user", "hi".to_string())];
        let request = ChatRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.3,
            max_tokens: 100,
            tools: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json["messages"][0].get("tool_calls").is_none());
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = EngineConfig {
            key: KeySource::from_env_var("DOSSIER_TEST_OPENAI_UNSET"),
            ..EngineConfig::default()
        };
        match OpenAiEngine::from_config(&config, "Dossier") {
            Err(EngineError::NotConfigured(_)) => {}
            _ => panic!("Expected NotConfigured"),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::secrets::{expand_home, KeySource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    /// Defaults to `<data_directory>/dossier.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            data_directory: default_data_directory(),
            database_path: None,
            worker_count: default_worker_count(),
            budget: BudgetConfig::default(),
            engine: EngineConfig::default(),
            search: SearchConfig::default(),
            images: ImagesConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.data_directory))
    }

    pub fn database_file(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(expand_home(path)),
            None => self.data_dir().join("dossier.db"),
        }
    }
}

fn default_data_directory() -> String {
    dirs::home_dir()
        .map(|h| h.join(".dossier").join("data").to_string_lossy().into_owned())
        .unwrap_or_else(|| "./dossier-data".to_string())
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

/// Wall-clock limits, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetConfig {
    #[serde(default = "default_total_seconds")]
    pub total_seconds: f64,
    #[serde(default = "default_fast_extractor_seconds")]
    pub fast_extractor_seconds: f64,
    #[serde(default = "default_heavy_parser_seconds")]
    pub heavy_parser_seconds: f64,
    #[serde(default = "default_engine_seconds")]
    pub engine_seconds: f64,
}

fn default_total_seconds() -> f64 {
    120.0
}

fn default_fast_extractor_seconds() -> f64 {
    3.0
}

fn default_heavy_parser_seconds() -> f64 {
    45.0
}

fn default_engine_seconds() -> f64 {
    90.0
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_seconds: default_total_seconds(),
            fast_extractor_seconds: default_fast_extractor_seconds(),
            heavy_parser_seconds: default_heavy_parser_seconds(),
            engine_seconds: default_engine_seconds(),
        }
    }
}

impl BudgetConfig {
    pub fn budgets(&self) -> Budgets {
        Budgets {
            total: Duration::from_secs_f64(self.total_seconds),
            fast_extractor: Duration::from_secs_f64(self.fast_extractor_seconds),
            heavy_parser: Duration::from_secs_f64(self.heavy_parser_seconds),
            engine: Duration::from_secs_f64(self.engine_seconds),
        }
    }
}

/// Runtime form of [`BudgetConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub total: Duration,
    pub fast_extractor: Duration,
    pub heavy_parser: Duration,
    pub engine: Duration,
}

impl Default for Budgets {
    fn default() -> Self {
        BudgetConfig::default().budgets()
    }
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Rounds in which the model may call tools; the final round has none.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(flatten)]
    pub key: KeySource,
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_tool_rounds() -> u32 {
    4
}

fn default_openai_key() -> KeySource {
    KeySource::from_env_var("OPENAI_API_KEY")
}

impl EngineConfig {
    /// Key source with `OPENAI_API_KEY` as the fallback variable.
    pub fn key_source(&self) -> KeySource {
        self.key.clone().or_env_var("OPENAI_API_KEY")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_tool_rounds: default_max_tool_rounds(),
            key: default_openai_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    #[serde(flatten)]
    pub key: KeySource,
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_results() -> u32 {
    10
}

fn default_search_depth() -> String {
    "advanced".to_string()
}

fn default_search_key() -> KeySource {
    KeySource::from_env_var("TAVILY_API_KEY")
}

impl SearchConfig {
    pub fn key_source(&self) -> KeySource {
        self.key.clone().or_env_var("TAVILY_API_KEY")
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
            search_depth: default_search_depth(),
            key: default_search_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Images per report, clamped to 2..=4.
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub stock: StockConfig,
}

fn default_max_images() -> usize {
    3
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
            generator: GeneratorConfig::default(),
            stock: StockConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(flatten)]
    pub key: KeySource,
}

fn default_true() -> bool {
    true
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1792x1024".to_string()
}

impl GeneratorConfig {
    pub fn key_source(&self) -> KeySource {
        self.key.clone().or_env_var("OPENAI_API_KEY")
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_openai_endpoint(),
            model: default_image_model(),
            size: default_image_size(),
            key: default_openai_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockConfig {
    #[serde(default = "default_stock_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(flatten)]
    pub key: KeySource,
}

fn default_stock_endpoint() -> String {
    "https://pixabay.com/api/".to_string()
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_stock_key() -> KeySource {
    KeySource::from_env_var("PIXABAY_API_KEY")
}

impl StockConfig {
    pub fn key_source(&self) -> KeySource {
        self.key.clone().or_env_var("PIXABAY_API_KEY")
    }
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            endpoint: default_stock_endpoint(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            key: default_stock_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Name printed in the "generated by" lines and the PDF footer.
    #[serde(default = "default_brand")]
    pub brand: String,
    /// Exporters to run; unknown names are rejected by validation.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

fn default_brand() -> String {
    "Dossier".to_string()
}

fn default_formats() -> Vec<String> {
    ["pdf", "docx", "xlsx", "txt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            formats: default_formats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: Config = serde_json::from_str(r#"{"version": "1.0"}"#).unwrap();
        assert_eq!(config.budget.total_seconds, 120.0);
        assert_eq!(config.budget.engine_seconds, 90.0);
        assert_eq!(config.engine.model, "gpt-4o");
        assert_eq!(config.engine.max_tool_rounds, 4);
        assert_eq!(config.search.max_results, 10);
        assert_eq!(config.search.search_depth, "advanced");
        assert_eq!(config.images.max_images, 3);
        assert_eq!(config.report.formats.len(), 4);
        assert!(config.worker_count >= 1);
    }

    #[test]
    fn test_flattened_key_source() {
        let config: Config = serde_json::from_str(
            r#"{"version": "1.0", "engine": {"api_key": "sk-direct", "model": "gpt-4o-mini"}}"#,
        )
        .unwrap();
        assert_eq!(config.engine.key.api_key.as_deref(), Some("sk-direct"));
        assert_eq!(config.engine.model, "gpt-4o-mini");
    }

    #[test]
    fn test_key_source_falls_back_to_env_var() {
        let config: Config =
            serde_json::from_str(r#"{"version": "1.0", "engine": {"model": "gpt-4o"}}"#).unwrap();
        assert_eq!(
            config.engine.key_source().api_key_env.as_deref(),
            Some("OPENAI_API_KEY")
        );
        assert_eq!(
            config.search.key_source().api_key_env.as_deref(),
            Some("TAVILY_API_KEY")
        );
        assert_eq!(
            config.images.stock.key_source().api_key_env.as_deref(),
            Some("PIXABAY_API_KEY")
        );
    }

    #[test]
    fn test_explicit_key_file_suppresses_env_fallback() {
        let config: Config = serde_json::from_str(
            r#"{"version": "1.0", "search": {"api_key_file": "/run/secrets/tavily"}}"#,
        )
        .unwrap();
        let source = config.search.key_source();
        assert_eq!(source.api_key_file.as_deref(), Some("/run/secrets/tavily"));
        assert!(source.api_key_env.is_none());
    }

    #[test]
    fn test_budgets_conversion() {
        let budgets = BudgetConfig {
            total_seconds: 1.5,
            fast_extractor_seconds: 0.25,
            heavy_parser_seconds: 1.0,
            engine_seconds: 1.0,
        }
        .budgets();
        assert_eq!(budgets.total, Duration::from_millis(1500));
        assert_eq!(budgets.fast_extractor, Duration::from_millis(250));
    }

    #[test]
    fn test_database_file_defaults_into_data_dir() {
        let config = Config {
            data_directory: "/srv/dossier".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.database_file(),
            PathBuf::from("/srv/dossier/dossier.db")
        );
    }
}

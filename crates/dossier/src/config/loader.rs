use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

const KNOWN_FORMATS: &[&str] = &["pdf", "docx", "xlsx", "txt"];

/// Loads a config file. `.yaml`/`.yml` files are parsed as YAML, anything
/// else as JSON; both go through the same schema.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        load_config_from_yaml_str(&content)
    } else {
        load_config_from_str(&content)
    }
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;
    load_config_from_value(json_value)
}

pub fn load_config_from_yaml_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_yaml::from_str(content)?;
    load_config_from_value(json_value)
}

fn load_config_from_value(json_value: serde_json::Value) -> Result<Config, ConfigError> {
    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();

    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    let budget = &config.budget;
    for (name, value) in [
        ("total_seconds", budget.total_seconds),
        ("fast_extractor_seconds", budget.fast_extractor_seconds),
        ("heavy_parser_seconds", budget.heavy_parser_seconds),
        ("engine_seconds", budget.engine_seconds),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::Validation {
                message: format!("budget.{} must be a positive number", name),
            });
        }
    }

    if budget.engine_seconds > budget.total_seconds {
        return Err(ConfigError::Validation {
            message: format!(
                "budget.engine_seconds ({}) exceeds budget.total_seconds ({})",
                budget.engine_seconds, budget.total_seconds
            ),
        });
    }

    if !(2..=4).contains(&config.images.max_images) {
        return Err(ConfigError::Validation {
            message: format!(
                "images.max_images must be between 2 and 4, got {}",
                config.images.max_images
            ),
        });
    }

    for format in &config.report.formats {
        if !KNOWN_FORMATS.contains(&format.as_str()) {
            return Err(ConfigError::Validation {
                message: format!("Unknown report format: {}", format),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(r#"{"version": "1.0"}"#).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.budget.total_seconds, 120.0);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "data_directory": "/var/lib/dossier",
            "worker_count": 4,
            "budget": {
                "total_seconds": 60,
                "fast_extractor_seconds": 2,
                "heavy_parser_seconds": 20,
                "engine_seconds": 45
            },
            "engine": {
                "endpoint": "http://localhost:8080/v1",
                "model": "local-model",
                "max_tool_rounds": 2,
                "api_key_env": "LOCAL_LLM_KEY"
            },
            "search": { "max_results": 5, "search_depth": "basic" },
            "images": { "max_images": 2, "generator": { "enabled": false } },
            "report": { "brand": "Acme Research", "formats": ["pdf", "txt"] }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.budget.engine_seconds, 45.0);
        assert_eq!(config.engine.model, "local-model");
        assert_eq!(config.engine.key.api_key_env.as_deref(), Some("LOCAL_LLM_KEY"));
        assert_eq!(config.search.search_depth, "basic");
        assert!(!config.images.generator.enabled);
        assert_eq!(config.report.formats, vec!["pdf", "txt"]);
    }

    #[test]
    fn test_load_yaml_config() {
        let yaml = r#"
version: "1.0"
worker_count: 2
engine:
  model: gpt-4o-mini
images:
  max_images: 4
"#;
        let config = load_config_from_yaml_str(yaml).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.engine.model, "gpt-4o-mini");
        assert_eq!(config.images.max_images, 4);
    }

    #[test]
    fn test_load_config_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dossier.yml");
        std::fs::write(&path, "version: \"1.0\"\nworker_count: 3\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.worker_count, 3);
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{"version": "2.0"}"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_missing_version_fails_schema() {
        let result = load_config_from_str(r#"{"worker_count": 2}"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_section_fails_schema() {
        let result = load_config_from_str(r#"{"version": "1.0", "ocr": {}}"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_max_images_out_of_range() {
        let result = load_config_from_str(r#"{"version": "1.0", "images": {"max_images": 6}}"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_engine_budget_exceeding_total() {
        let result = load_config_from_str(
            r#"{"version": "1.0", "budget": {"total_seconds": 30, "engine_seconds": 60}}"#,
        );
        match result {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("engine_seconds"));
            }
            other => panic!("Expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unknown_report_format_rejected() {
        let result = load_config_from_str(r#"{"version": "1.0", "report": {"formats": ["odt"]}}"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/dossier.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::error::ImageError;
use crate::images::style::generator_prompt;
use crate::images::{ImageProvider, ImageRequest, ImageSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    #[serde(default)]
    b64_json: Option<String>,
}

/// OpenAI images endpoint (`POST {endpoint}/images/generations`).
pub struct DalleGenerator {
    client: Client,
    url: String,
    model: String,
    size: String,
    api_key: SecretString,
}

impl DalleGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Result<Option<Self>, ImageError> {
        let key = config
            .key_source()
            .resolve()
            .map_err(|_| ImageError::NotConfigured("generator"))?;
        let Some(api_key) = key else {
            return Ok(None);
        };

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Some(Self {
            client,
            url: format!("{}/images/generations", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            size: config.size.clone(),
            api_key,
        }))
    }
}

fn decode_first(response: GenerationResponse) -> Result<Vec<u8>, ImageError> {
    let encoded = response
        .data
        .into_iter()
        .find_map(|d| d.b64_json)
        .ok_or_else(|| ImageError::InvalidPayload("no b64_json in response".to_string()))?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ImageError::InvalidPayload(format!("bad base64: {}", e)))
}

#[async_trait]
impl ImageProvider for DalleGenerator {
    fn name(&self) -> &'static str {
        "dall-e"
    }

    fn source(&self) -> ImageSource {
        ImageSource::Generated
    }

    async fn fetch(&self, request: &ImageRequest) -> Result<Vec<u8>, ImageError> {
        let prompt = generator_prompt(&request.topic, request.domain, request.kind);
        let body = GenerationRequest {
            model: &self.model,
            prompt: &prompt,
            size: &self.size,
            quality: "standard",
            response_format: "b64_json",
            n: 1,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImageError::Status {
                status: response.status().as_u16(),
            });
        }

        let parsed: GenerationResponse = response.json().await?;
        let bytes = decode_first(parsed)?;
        tracing::debug!(bytes = bytes.len(), "Generated image received");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::KeySource;

    #[test]
    fn test_decode_first_image() {
        let response: GenerationResponse =
            serde_json::from_str(r#"{"data":[{"b64_json":"aGVsbG8="}]}"#).unwrap();
        assert_eq!(decode_first(response).unwrap(), b"hello");
    }

    #[test]
    fn test_missing_payload() {
        let response: GenerationResponse =
            serde_json::from_str(r#"{"data":[{"url":"https://x"}]}"#).unwrap();
        assert!(matches!(
            decode_first(response),
            Err(ImageError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_unconfigured_generator_is_skipped() {
        let config = GeneratorConfig {
            key: KeySource::from_env_var("DOSSIER_TEST_IMAGES_UNSET"),
            ..GeneratorConfig::default()
        };
        assert!(DalleGenerator::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_request_shape() {
        let body = GenerationRequest {
            model: "dall-e-3",
            prompt: "p",
            size: "1792x1024",
            quality: "standard",
            response_format: "b64_json",
            n: 1,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"], "b64_json");
        assert_eq!(json["size"], "1792x1024");
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::StockConfig;
use crate::error::ImageError;
use crate::images::style::visual_style;
use crate::images::{ImageProvider, ImageRequest, ImageSource};
use crate::sanitize::{redact_url, truncate_chars};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_QUERY_CHARS: usize = 100;
pub const MAX_DOWNLOAD_BYTES: usize = 500 * 1024;
const CACHE_CAPACITY: u64 = 128;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "webformatURL", default)]
    webformat_url: String,
}

/// Pixabay photo search. Downloads are memoized per URL for the configured
/// TTL.
pub struct PixabayStock {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    cache: Cache<String, Arc<Vec<u8>>>,
}

/// Topic plus domain keywords, cut to what the API accepts.
pub fn stock_query(request: &ImageRequest) -> String {
    let full = format!(
        "{} {}",
        request.topic.trim(),
        visual_style(request.domain).stock_keywords
    );
    truncate_chars(&full, MAX_QUERY_CHARS).trim_end().to_string()
}

impl PixabayStock {
    pub fn from_config(config: &StockConfig) -> Result<Option<Self>, ImageError> {
        let key = config
            .key_source()
            .resolve()
            .map_err(|_| ImageError::NotConfigured("stock"))?;
        let Some(api_key) = key else {
            return Ok(None);
        };

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .build();

        Ok(Some(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            cache,
        }))
    }

    async fn first_hit(&self, query: &str) -> Result<String, ImageError> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(SEARCH_TIMEOUT)
            .query(&[
                ("key", self.api_key.expose_secret()),
                ("q", query),
                ("image_type", "photo"),
                ("orientation", "horizontal"),
                ("min_width", "800"),
                ("per_page", "3"),
                ("safesearch", "true"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImageError::Status {
                status: response.status().as_u16(),
            });
        }

        let parsed: SearchResponse = response.json().await?;
        parsed
            .hits
            .into_iter()
            .map(|h| h.webformat_url)
            .find(|url| !url.is_empty())
            .ok_or_else(|| ImageError::NoResult(query.to_string()))
    }

    async fn download(&self, url: &str) -> Result<Arc<Vec<u8>>, ImageError> {
        if let Some(hit) = self.cache.get(url) {
            tracing::debug!(url = %redact_url(url), "Stock image cache hit");
            return Ok(hit);
        }

        let mut response = self
            .client
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ImageError::Status {
                status: response.status().as_u16(),
            });
        }
        if let Some(length) = response.content_length() {
            check_size(length as usize)?;
        }

        // Content-Length may be absent, so the cap is enforced while reading.
        let mut body = CappedBody::default();
        while let Some(chunk) = response.chunk().await? {
            body.push(&chunk)?;
        }

        let bytes = Arc::new(body.into_inner());
        self.cache.insert(url.to_string(), bytes.clone());
        Ok(bytes)
    }
}

fn check_size(len: usize) -> Result<(), ImageError> {
    if len > MAX_DOWNLOAD_BYTES {
        Err(ImageError::TooLarge {
            limit: MAX_DOWNLOAD_BYTES,
        })
    } else {
        Ok(())
    }
}

#[derive(Default)]
struct CappedBody {
    bytes: Vec<u8>,
}

impl CappedBody {
    fn push(&mut self, chunk: &[u8]) -> Result<(), ImageError> {
        check_size(self.bytes.len() + chunk.len())?;
        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

#[async_trait]
impl ImageProvider for PixabayStock {
    fn name(&self) -> &'static str {
        "pixabay"
    }

    fn source(&self) -> ImageSource {
        ImageSource::Stock
    }

    async fn fetch(&self, request: &ImageRequest) -> Result<Vec<u8>, ImageError> {
        let query = stock_query(request);
        let url = self.first_hit(&query).await?;
        let bytes = self.download(&url).await?;
        Ok(bytes.as_ref().clone())
    }
}

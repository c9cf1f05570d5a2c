//! Optional report illustrations.
//!
//! Each image walks an ordered provider chain (generator, stock photos) and
//! ends at the local renderer, which always produces something. Provider
//! failures become warnings, never job failures.

pub mod dalle;
pub mod local;
pub mod stock;
pub mod style;
pub mod topics;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use image::{DynamicImage, GenericImageView};
use serde::Serialize;

use crate::config::ImagesConfig;
use crate::error::ImageError;
use crate::sanitize::truncate_chars;
use crate::worker::{Domain, JobConfig, Locale};

pub use dalle::DalleGenerator;
pub use local::LocalRenderer;
pub use stock::PixabayStock;

pub const MIN_IMAGES: usize = 2;
pub const MAX_IMAGES: usize = 4;
const MAX_IMAGE_WIDTH: u32 = 1200;
const JPEG_QUALITY: u8 = 85;
const CAPTION_TOPIC_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Generated,
    Stock,
    Local,
}

/// Where an image goes in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The figures section.
    Figures,
    /// End of the section whose heading mentions this topic.
    AfterSection(String),
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub topic: String,
    pub domain: Domain,
    /// Kind of picture asked from the generator, e.g. "professional infographic".
    pub kind: &'static str,
    pub caption: String,
    pub placement: Placement,
}

/// A JPEG ready to embed.
#[derive(Debug, Clone)]
pub struct ReportImage {
    pub caption: String,
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source: ImageSource,
    pub placement: Placement,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn source(&self) -> ImageSource;
    /// Raw encoded image bytes for the request.
    async fn fetch(&self, request: &ImageRequest) -> Result<Vec<u8>, ImageError>;
}

/// Re-encodes any supported image as a JPEG no wider than 1200 px.
pub fn normalize_jpeg(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32), ImageError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ImageError::InvalidPayload(format!("undecodable image: {}", e)))?;
    let img = if img.width() > MAX_IMAGE_WIDTH {
        img.resize(
            MAX_IMAGE_WIDTH,
            u32::MAX,
            image::imageops::FilterType::Triangle,
        )
    } else {
        img
    };
    encode_jpeg(&DynamicImage::ImageRgb8(img.to_rgb8()))
}

pub(crate) fn encode_jpeg(img: &DynamicImage) -> Result<(Vec<u8>, u32, u32), ImageError> {
    let (width, height) = img.dimensions();
    let mut buffer = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| ImageError::Render(e.to_string()))?;
    Ok((buffer, width, height))
}

/// Result of one illustration pass.
#[derive(Debug, Default)]
pub struct ImageBatch {
    pub images: Vec<ReportImage>,
    pub warnings: Vec<String>,
}

pub struct ImageChain {
    providers: Vec<Arc<dyn ImageProvider>>,
    local: LocalRenderer,
    max_images: usize,
}

impl ImageChain {
    pub fn new(providers: Vec<Arc<dyn ImageProvider>>, max_images: usize) -> Self {
        Self {
            providers,
            local: LocalRenderer::default(),
            max_images: max_images.clamp(MIN_IMAGES, MAX_IMAGES),
        }
    }

    /// Generator then stock photos, each only when configured.
    pub fn from_config(config: &ImagesConfig) -> Self {
        let mut providers: Vec<Arc<dyn ImageProvider>> = Vec::new();

        if config.generator.enabled {
            match DalleGenerator::from_config(&config.generator) {
                Ok(Some(generator)) => providers.push(Arc::new(generator)),
                Ok(None) => tracing::info!("Image generator has no API key, skipping"),
                Err(e) => tracing::warn!(error = %e, "Image generator unavailable"),
            }
        }

        match PixabayStock::from_config(&config.stock) {
            Ok(Some(stock)) => providers.push(Arc::new(stock)),
            Ok(None) => tracing::info!("Stock photo search has no API key, skipping"),
            Err(e) => tracing::warn!(error = %e, "Stock photo search unavailable"),
        }

        Self::new(providers, config.max_images)
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Illustrations for a finished report, topics taken from its headings.
    pub fn standard_requests(&self, markdown: &str, config: &JobConfig) -> Vec<ImageRequest> {
        let found = topics::markdown_topics(markdown, self.max_images);
        topics::pad_with_objective(found, &config.objective, self.max_images)
            .into_iter()
            .enumerate()
            .map(|(i, topic)| ImageRequest {
                kind: if i == 0 {
                    "professional infographic"
                } else {
                    "professional illustration"
                },
                caption: topic.clone(),
                domain: config.domain,
                placement: Placement::Figures,
                topic,
            })
            .collect()
    }

    /// Illustrations for an enhanced document, one per source section.
    pub fn enhancement_requests(&self, source_text: &str, config: &JobConfig) -> Vec<ImageRequest> {
        let found = topics::markdown_topics(source_text, self.max_images);
        topics::pad_with_objective(found, &config.objective, self.max_images)
            .into_iter()
            .map(|topic| ImageRequest {
                kind: "high-end professional photograph or detailed illustration",
                caption: format!(
                    "{}: {}",
                    illustration_label(config.locale),
                    truncate_chars(&topic, CAPTION_TOPIC_CHARS)
                ),
                domain: config.domain,
                placement: Placement::AfterSection(topic.clone()),
                topic,
            })
            .collect()
    }

    /// Renders every request concurrently.
    pub async fn render_all(&self, requests: Vec<ImageRequest>) -> ImageBatch {
        let results = join_all(requests.iter().map(|r| self.render(r))).await;

        let mut batch = ImageBatch::default();
        for (image, warnings) in results {
            batch.warnings.extend(warnings);
            batch.images.extend(image);
        }
        tracing::info!(
            images = batch.images.len(),
            warnings = batch.warnings.len(),
            "Illustrations rendered"
        );
        batch
    }

    async fn render(&self, request: &ImageRequest) -> (Option<ReportImage>, Vec<String>) {
        let mut warnings = Vec::new();

        for provider in &self.providers {
            let attempt = match provider.fetch(request).await {
                Ok(bytes) => normalize_jpeg(&bytes),
                Err(e) => Err(e),
            };
            match attempt {
                Ok((jpeg, width, height)) => {
                    tracing::debug!(provider = provider.name(), topic = %request.topic, "Image ready");
                    return (
                        Some(self.image(request, jpeg, width, height, provider.source())),
                        warnings,
                    );
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Image provider failed");
                    warnings.push(format!(
                        "image '{}' via {}: {}",
                        truncate_chars(&request.topic, 40),
                        provider.name(),
                        e
                    ));
                }
            }
        }

        match self.local.render(request) {
            Ok((jpeg, width, height)) => (
                Some(self.image(request, jpeg, width, height, ImageSource::Local)),
                warnings,
            ),
            Err(e) => {
                warnings.push(format!("image '{}' local rendering: {}", request.topic, e));
                (None, warnings)
            }
        }
    }

    fn image(
        &self,
        request: &ImageRequest,
        jpeg: Vec<u8>,
        width: u32,
        height: u32,
        source: ImageSource,
    ) -> ReportImage {
        ReportImage {
            caption: request.caption.clone(),
            jpeg,
            width,
            height,
            source,
            placement: request.placement.clone(),
        }
    }
}

fn illustration_label(locale: Locale) -> &'static str {
    match locale {
        Locale::PtBr => "Ilustração",
        Locale::En => "Illustration",
        Locale::Es => "Ilustración",
    }
}

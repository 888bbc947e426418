use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MediaConfig;

const TEXT_TO_IMAGE_PATH: &str = "/fal-ai/flux-pro/kontext/text-to-image";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media generation is not configured")]
    NotConfigured,

    #[error("network error: {0}")]
    Network(String),

    #[error("media API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed media response: {0}")]
    Parse(String),

    #[error("media response contained no images")]
    Empty,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub aspect_ratio: String,
    pub num_images: u32,
}

impl ImageRequest {
    pub fn widescreen(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: "16:9".to_string(),
            num_images: 1,
        }
    }
}

/// Text-to-image backend. Implementations return asset URLs; persisting the
/// bytes is the caller's job.
#[async_trait]
pub trait MediaGenerator: Send + Sync {
    async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<String>, MediaError>;

    async fn download(&self, url: &str) -> Result<Vec<u8>, MediaError>;
}

/// Stands in when no API key is configured; every request fails so callers
/// fall back to placeholders.
pub struct DisabledMedia;

#[async_trait]
impl MediaGenerator for DisabledMedia {
    async fn generate_image(&self, _request: &ImageRequest) -> Result<Vec<String>, MediaError> {
        Err(MediaError::NotConfigured)
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, MediaError> {
        Err(MediaError::NotConfigured)
    }
}

pub struct FalClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct FalRequest<'a> {
    prompt: &'a str,
    aspect_ratio: &'a str,
    num_images: u32,
    guidance_scale: f32,
    safety_tolerance: &'a str,
    enhance_prompt: bool,
}

#[derive(Deserialize)]
struct FalResponse {
    #[serde(default)]
    images: Vec<FalImage>,
}

#[derive(Deserialize)]
struct FalImage {
    url: String,
}

impl FalClient {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn build_headers(&self) -> Result<HeaderMap, MediaError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Key {}", self.api_key))
                .map_err(|e| MediaError::Network(format!("invalid API key header: {e}")))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl MediaGenerator for FalClient {
    async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<String>, MediaError> {
        let body = FalRequest {
            prompt: &request.prompt,
            aspect_ratio: &request.aspect_ratio,
            num_images: request.num_images,
            guidance_scale: 3.5,
            safety_tolerance: "4",
            enhance_prompt: true,
        };
        let response = self
            .client
            .post(format!("{}{}", self.base_url, TEXT_TO_IMAGE_PATH))
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(MediaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: FalResponse = response
            .json()
            .await
            .map_err(|e| MediaError::Parse(e.to_string()))?;
        let urls: Vec<String> = parsed.images.into_iter().map(|i| i.url).collect();
        if urls.is_empty() {
            return Err(MediaError::Empty);
        }
        Ok(urls)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MediaError::Api {
                status: response.status().as_u16(),
                message: format!("download failed for {url}"),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

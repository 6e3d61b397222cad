//! OpenAI 互換の画像生成 API と HTTP 取得

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::resolver::{ImageGenerator, RemoteFetcher};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ImageResponse {
    fn first_url(self) -> Option<String> {
        self.data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .filter(|u| !u.is_empty())
    }
}

/// API のエラー応答から人が読めるメッセージを取り出す
fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => format!("API request failed with status {}: {}", status, body),
    }
}

pub struct OpenAiImageGenerator {
    client: Client,
    api_key: String,
    config: GenerationConfig,
}

impl OpenAiImageGenerator {
    pub fn new(api_key: String, config: GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Upstream(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    /// API キーは環境変数から読む
    pub fn from_env(config: GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(GenerationError::MissingApiKey)?;
        Self::new(api_key, config)
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ImageRequest<'a> {
        ImageRequest {
            model: &self.config.model,
            prompt,
            n: 1,
            size: &self.config.size,
            quality: &self.config.quality,
            response_format: "url",
        }
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/images/generations", self.config.api_base.trim_end_matches('/'));
        info!(model = %self.config.model, size = %self.config.size, "requesting image generation");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| GenerationError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_message(status, &body);
            warn!(%status, %message, "image generation failed");
            return Err(GenerationError::Upstream(message));
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Upstream(e.to_string()))?;
        parsed.first_url().ok_or(GenerationError::NoImageUrl)
    }
}

/// 素の HTTP GET で中身を取る
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, GenerationError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GenerationError::Fetch(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

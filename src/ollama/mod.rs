// Upstream inference server client
// Streaming generation transport, non-streaming generation and the health/model probes


use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::stream::{ByteStream, RelayConfig, TransportError, UpstreamTransport};

/// Sampling options forwarded to the inference server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: i32,
    pub num_ctx: u32,
}

impl Default for GenerationOptions {
    #[inline]
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 256,
            num_ctx: 4096,
        }
    }
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
    pub options: GenerationOptions,
}

impl GenerateRequest {
    /// A streaming request with no keep-alive hint.
    #[inline]
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: true,
            keep_alive: None,
            options,
        }
    }

    #[inline]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }
}

/// Reply to a non-streaming generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateResponse {
    pub model: String,
    pub response: String,
    pub total_duration: u64,
    pub eval_count: u64,
    pub prompt_eval_count: u64,
    pub eval_duration: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(flatten)]
    generated: GenerateResponse,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub modified_at: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// HTTP client for an Ollama-compatible inference server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Build a client whose connect and total timeouts come from `relay`.
    ///
    /// Per-read and idle limits are enforced by the relay itself.
    #[inline]
    pub fn new(base_url: Url, relay: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(relay.connect_timeout())
            .timeout(relay.total_timeout())
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self { base_url, client })
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;
        Self::new(base_url, &config.relay)
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {path}"))
    }

    /// Whether the server answers its model listing with a success status.
    #[inline]
    pub async fn health_check(&self) -> bool {
        let url = match self.endpoint("/api/tags") {
            Ok(url) => url,
            Err(e) => {
                warn!("Health check skipped: {:#}", e);
                return false;
            }
        };

        debug!("Performing health check for Ollama at {}", url);

        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Health check failed with HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                false
            }
        }
    }

    /// List all available models
    #[inline]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch models")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Model listing failed with HTTP {}: {}", status, body));
        }

        let models: ModelsResponse = response
            .json()
            .await
            .context("Failed to parse models response")?;

        debug!("Found {} models", models.models.len());
        Ok(models.models)
    }

    /// Generate a complete response in one round trip.
    #[inline]
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let url = self.endpoint("/api/generate")?;
        let request = GenerateRequest {
            stream: false,
            ..request.clone()
        };

        debug!(
            "Generating non-streaming response with model {}",
            request.model
        );

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .context("Failed to send generate request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Generation failed with HTTP {}: {}", status, body));
        }

        let reply: GenerateReply = response
            .json()
            .await
            .context("Failed to parse generate response")?;

        if let Some(error) = reply.error {
            return Err(anyhow!("Upstream reported an error: {}", error));
        }

        let generated = reply.generated;

        info!(
            "Generated {} tokens with model {}",
            generated.eval_count, generated.model
        );
        Ok(generated)
    }
}

#[async_trait]
impl UpstreamTransport for OllamaClient {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<ByteStream, TransportError> {
        let url = self
            .endpoint("/api/generate")
            .map_err(|e| TransportError::Request(format!("{e:#}")))?;
        let request = GenerateRequest {
            stream: true,
            ..request.clone()
        };

        let response = self.client.post(url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes_stream().map_err(TransportError::from).boxed())
    }
}

impl From<reqwest::Error> for TransportError {
    #[inline]
    fn from(error: reqwest::Error) -> Self {
        let message = error.to_string();

        if error.is_timeout() {
            Self::Timeout(message)
        } else if error.is_connect() {
            Self::Connect(message)
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                body: message,
            }
        } else if error.is_body() || error.is_decode() || error.is_request() {
            Self::Reset(message)
        } else {
            Self::Request(message)
        }
    }
}

//! OpenAI-compatible embedding and generation providers.
//!
//! Both providers call the REST API directly with `reqwest` and work against
//! any OpenAI-compatible endpoint (OpenRouter, Azure-style gateways, local
//! servers) via [`with_base_url`](OpenAIEmbeddingProvider::with_base_url).
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::prompt::PromptPayload;
use crate::synthesis::GenerationProvider;

/// The default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Optional attribution headers some OpenAI-compatible gateways expect.
#[derive(Debug, Clone, Default)]
pub struct AppAttribution {
    /// Sent as `HTTP-Referer`.
    pub url: Option<String>,
    /// Sent as `X-Title`.
    pub name: Option<String>,
}

fn build_client(
    attribution: &AppAttribution,
    timeout: Duration,
) -> std::result::Result<reqwest::Client, String> {
    let mut headers = HeaderMap::new();
    for (name, value) in [("http-referer", &attribution.url), ("x-title", &attribution.name)] {
        if let Some(value) = value {
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("invalid {name} header value: {e}"))?;
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

/// Whether a failed request may succeed later without any change on our side.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Error for a request the provider refused outright (bad key, unknown model).
fn rejected(provider: &str, status: StatusCode, detail: &str) -> RagError {
    RagError::ConfigError(format!("{provider} rejected the request ({status}): {detail}"))
}

/// Extract a readable message from an OpenAI error body.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embeddings ─────────────────────────────────────────────────────

/// Output size of OpenAI embedding models, ignoring any vendor prefix such as `openai/`.
fn native_dimensions(model: &str) -> Option<usize> {
    match model.rsplit('/').next().unwrap_or(model) {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `base_url` – defaults to `https://api.openai.com/v1`.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    name: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }
        let client = build_client(&AppAttribution::default(), DEFAULT_TIMEOUT)
            .map_err(RagError::ConfigError)?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            name: format!("OpenAI/{DEFAULT_EMBEDDING_MODEL}"),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::ConfigError("OPENAI_API_KEY environment variable not set".into())
        })?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    ///
    /// Known OpenAI models also set their native dimensionality.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.name = format!("OpenAI/{}", self.model);
        if let Some(dims) = native_dimensions(&self.model) {
            self.dimensions = self.request_dimensions.unwrap_or(dims);
        }
        self
    }

    /// Point the provider at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Declare the model's native dimensionality without requesting truncation.
    pub fn with_native_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = None;
        self
    }

    /// Rebuild the HTTP client with attribution headers and a request timeout.
    pub fn with_client_options(
        mut self,
        attribution: &AppAttribution,
        timeout: Duration,
    ) -> Result<Self> {
        self.client = build_client(attribution, timeout).map_err(RagError::ConfigError)?;
        Ok(self)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = %self.name, text_len = text.len(), "embedding single text");

        let results = self.embed_many(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(&self.name, "API returned empty response"))
    }

    async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = %self.name, batch_size = texts.len(), "embedding batch");

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.name, error = %e, "request failed");
                RagError::embedding(&self.name, format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = %self.name, %status, "API error");
            if !is_transient(status) {
                return Err(rejected(&self.name, status, &detail));
            }
            let message = format!("API returned {status}: {detail}");
            return Err(RagError::embedding(&self.name, message));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = %self.name, error = %e, "failed to parse response");
            RagError::embedding(&self.name, format!("failed to parse response: {e}"))
        })?;

        let mut data = embedding_response.data;
        if data.len() != texts.len() {
            return Err(RagError::embedding(
                &self.name,
                format!("expected {} embeddings, got {}", texts.len(), data.len()),
            ));
        }
        // The API may reorder entries; `index` restores input order.
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── Generation ─────────────────────────────────────────────────────

/// A [`GenerationProvider`] backed by the OpenAI chat completions API.
///
/// Sends the grounding instructions as the system message and the context
/// plus question as the user message, at a low temperature and (unless
/// disabled) with JSON-object response format.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIGenerationProvider;
///
/// let provider = OpenAIGenerationProvider::new("sk-...")?.with_model("gpt-4o-mini");
/// ```
pub struct OpenAIGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    name: String,
    temperature: f32,
    json_mode: bool,
}

impl OpenAIGenerationProvider {
    /// Create a new provider with the given API key and the default model (`gpt-4o`).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }
        let client = build_client(&AppAttribution::default(), DEFAULT_TIMEOUT)
            .map_err(RagError::ConfigError)?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
            name: format!("OpenAI/{DEFAULT_CHAT_MODEL}"),
            temperature: 0.2,
            json_mode: true,
        })
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.name = format!("OpenAI/{}", self.model);
        self
    }

    /// Point the provider at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Request `response_format: json_object`. Some compatible servers reject it.
    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    /// Rebuild the HTTP client with attribution headers and a request timeout.
    pub fn with_client_options(
        mut self,
        attribution: &AppAttribution,
        timeout: Duration,
    ) -> Result<Self> {
        self.client = build_client(attribution, timeout).map_err(RagError::ConfigError)?;
        Ok(self)
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerationProvider {
    async fn generate(&self, payload: &PromptPayload) -> Result<String> {
        let user_message = payload.user_message();
        let request_body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &payload.instructions },
                ChatMessage { role: "user", content: &user_message },
            ],
            temperature: self.temperature,
            response_format: self.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(provider = %self.name, prompt_len = user_message.len(), "requesting completion");

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                let timeout = e.is_timeout();
                error!(provider = %self.name, error = %e, timeout, "request failed");
                RagError::generation(&self.name, format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = %self.name, %status, "API error");
            if !is_transient(status) {
                return Err(rejected(&self.name, status, &detail));
            }
            let message = if status == StatusCode::TOO_MANY_REQUESTS {
                format!("rate limited: {detail}")
            } else {
                format!("API returned {status}: {detail}")
            };
            return Err(RagError::generation(&self.name, message));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = %self.name, error = %e, "failed to parse response");
            RagError::generation(&self.name, format!("failed to parse response: {e}"))
        })?;

        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
        assert_eq!(
            endpoint("http://localhost:8080/v1", "chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn error_detail_prefers_api_message() {
        assert_eq!(error_detail(r#"{"error": {"message": "bad key"}}"#.to_string()), "bad key");
        assert_eq!(error_detail("gateway timeout".to_string()), "gateway timeout");
    }

    #[test]
    fn known_models_set_native_dimensions() {
        let provider =
            OpenAIEmbeddingProvider::new("k").unwrap().with_model("text-embedding-3-large");
        assert_eq!(provider.dimensions(), 3072);
        let provider =
            OpenAIEmbeddingProvider::new("k").unwrap().with_model("openai/text-embedding-3-small");
        assert_eq!(provider.dimensions(), 1536);
        let provider = OpenAIEmbeddingProvider::new("k")
            .unwrap()
            .with_dimensions(256)
            .with_model("text-embedding-3-large");
        assert_eq!(provider.dimensions(), 256);
    }

    #[test]
    fn unknown_models_take_a_declared_native_size() {
        let provider = OpenAIEmbeddingProvider::new("k").unwrap().with_model("nomic-embed-text");
        assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);

        let provider = OpenAIEmbeddingProvider::new("k")
            .unwrap()
            .with_model("nomic-embed-text")
            .with_native_dimensions(768);
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.request_dimensions, None);
        assert!(crate::embedding::check_dimensions(&provider, &[0.5; 768]).is_ok());
    }

    #[test]
    fn only_timeouts_rate_limits_and_server_errors_are_transient() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(is_transient(status), "{status}");
        }
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED, StatusCode::NOT_FOUND] {
            assert!(!is_transient(status), "{status}");
        }
    }

    #[test]
    fn rejected_requests_are_configuration_errors() {
        let err = rejected("OpenAI/gpt-4o", StatusCode::UNAUTHORIZED, "Incorrect API key provided");
        assert_eq!(err.kind(), crate::ErrorKind::ConfigurationError);
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Incorrect API key"));
    }

    #[test]
    fn empty_api_key_is_a_config_error() {
        assert!(OpenAIEmbeddingProvider::new("").is_err());
        assert!(OpenAIGenerationProvider::new("").is_err());
    }

    #[test]
    fn chat_request_serializes_json_mode() {
        let body = ChatRequest {
            model: "gpt-4o",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: 0.2,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");
    }
}

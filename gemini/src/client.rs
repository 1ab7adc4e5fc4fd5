//! Gemini API client implementation.

use crate::{
    error::GeminiError,
    types::{GenerateRequest, GenerateResponse},
};
use reqwest::{Client, StatusCode};
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl GeminiClient {
    /// Create a new client with API key from environment.
    ///
    /// Reads `GEMINI_API_KEY` (required) and `GEMINI_MODEL` (optional,
    /// defaults to `gemini-2.5-flash`).
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::MissingApiKey` if `GEMINI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, GeminiError> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| GeminiError::MissingApiKey)?;
        let mut client = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            client.model = model;
        }
        Ok(client)
    }

    /// Create a new client with explicit API key.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a mock server).
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Override the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Model this client targets.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Call `generateContent`.
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, API errors, or parsing
    /// failures.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GeminiError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<GenerateResponse>()
                .await
                .map_err(|e| GeminiError::ResponseParseFailed(e.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(GeminiError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GeminiError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GeminiError::ApiError {
                    status: status.as_u16(),
                    message: body,
                })
            }
        }
    }

    /// Schema-constrained single-turn inference with a hard deadline.
    ///
    /// Builds a structured request from `prompt` and `schema`, calls
    /// the API, and parses the first candidate's text as JSON. This is
    /// the black-box surface the pipeline builds on; it never retries.
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::Timeout` when the deadline elapses,
    /// `GeminiError::EmptyResponse` when no candidate came back, and
    /// `GeminiError::ResponseParseFailed` when the candidate text is
    /// not valid JSON.
    pub async fn infer(
        &self,
        prompt: &str,
        schema: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, GeminiError> {
        let request = GenerateRequest::structured(prompt, schema);

        let response = tokio::time::timeout(timeout, self.generate(request))
            .await
            .map_err(|_| GeminiError::Timeout(timeout))??;

        let text = response.first_text().ok_or(GeminiError::EmptyResponse)?;
        serde_json::from_str(text).map_err(|e| GeminiError::ResponseParseFailed(e.to_string()))
    }
}

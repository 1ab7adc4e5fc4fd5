//! Request and response types for the Gemini `generateContent` API.

use serde::{Deserialize, Serialize};

/// A content block in a request or response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Content {
    /// Parts making up this content block.
    pub parts: Vec<Part>,
    /// Role of the content producer (`user` or `model`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Content {
    /// Create a user content block with a single text part.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part { text: text.into() }],
            role: Some("user".to_string()),
        }
    }
}

/// A single text part.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Part {
    /// Text content.
    pub text: String,
}

/// Generation parameters. Field names follow the API's camelCase.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Response MIME type, e.g. `application/json` for structured
    /// output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    /// JSON schema the response must conform to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

/// Request body for `generateContent`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Conversation contents.
    pub contents: Vec<Content>,
    /// Generation parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    /// Build a single-turn request for a structured JSON response.
    ///
    /// Uses a low temperature; the pipeline wants consistent
    /// extraction and decisions, not creativity.
    #[must_use]
    pub fn structured(prompt: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            contents: vec![Content::user(prompt)],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.1),
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(schema),
            }),
        }
    }
}

/// One response candidate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.
    pub content: Content,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Number of prompt tokens.
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Number of generated tokens.
    #[serde(default)]
    pub candidates_token_count: u32,
}

/// Response body for `generateContent`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// Response candidates; the client uses the first.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Token usage, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Text of the first candidate, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    #[allow(clippy::unwrap_used)] // Test code
    fn structured_request_serializes_camel_case() {
        let request = GenerateRequest::structured("hello", json!({"type": "object"}));
        let body = serde_json::to_string(&request).unwrap();
        assert!(body.contains(r#""generationConfig""#));
        assert!(body.contains(r#""responseMimeType":"application/json""#));
        assert!(body.contains(r#""responseSchema""#));
    }

    #[test]
    #[allow(clippy::unwrap_used)] // Test code
    fn response_first_text() {
        let body = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"found\":true}" }], "role": "model" } }
            ],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 5 }
        });
        let response: GenerateResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.first_text(), Some("{\"found\":true}"));
        assert_eq!(response.usage_metadata.unwrap().prompt_token_count, 12);
    }

    #[test]
    fn empty_response_has_no_text() {
        let response = GenerateResponse {
            candidates: Vec::new(),
            usage_metadata: None,
        };
        assert_eq!(response.first_text(), None);
    }
}

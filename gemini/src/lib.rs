//! Gemini generative-language API client.
//!
//! A thin, typed client for the `generateContent` endpoint, used by the
//! triage pipeline for schema-constrained extraction and case analysis.
//! The pipeline treats the backend as a black-box function
//! `infer(prompt, schema, timeout) -> structured json | error`; this
//! crate provides exactly that surface plus the request/response types
//! behind it.
//!
//! # Example
//!
//! ```no_run
//! use refund_triage_gemini::GeminiClient;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), refund_triage_gemini::GeminiError> {
//! let client = GeminiClient::from_env()?;
//! let schema = json!({
//!     "type": "object",
//!     "properties": { "found": { "type": "boolean" } },
//!     "required": ["found"]
//! });
//! let value = client
//!     .infer("Extract booking information ...", schema, Duration::from_secs(10))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::GeminiClient;
pub use error::GeminiError;
pub use types::{
    Candidate, Content, GenerateRequest, GenerateResponse, GenerationConfig, Part, UsageMetadata,
};

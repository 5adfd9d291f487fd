//! Gemini API client for the shopping assistant.
//!
//! Wraps `generateContent` and `streamGenerateContent` (SSE) from the
//! Generative Language API.

mod client;
mod error;
mod types;

pub use client::GeminiClient;
pub use error::GeminiError;
pub use types::{
    Candidate, Content, GenerateRequest, GenerateResponse, GenerationConfig, Part, PromptFeedback,
};

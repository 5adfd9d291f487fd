//! Gemini API client.
//!
//! Provides both streaming and non-streaming access to `generateContent`.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::config::GeminiConfig;

use super::error::{ApiErrorResponse, GeminiError};
use super::types::{GenerateRequest, GenerateResponse};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    inner: Arc<GeminiClientInner>,
}

struct GeminiClientInner {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Create a new Gemini client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(config: &GeminiConfig) -> Result<Self, GeminiError> {
        Self::with_base_url(config, GEMINI_API_URL)
    }

    fn with_base_url(config: &GeminiConfig, base_url: &str) -> Result<Self, GeminiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|_| GeminiError::InvalidConfig("API key is not a valid header".into()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            inner: Arc::new(GeminiClientInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                model: config.model.clone(),
            }),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}:{method}", self.inner.base_url, self.inner.model)
    }

    /// Generate a complete response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the API answers with an error,
    /// the prompt is blocked, or the answer has no text.
    #[instrument(skip(self, request), fields(model = %self.inner.model, turns = request.contents.len()))]
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String, GeminiError> {
        let response = self
            .inner
            .client
            .post(self.url("generateContent"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_status(status, response).await);
        }

        let body = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| GeminiError::Parse(format!("Failed to parse response: {e}")))?;

        if let Some(reason) = parsed.block_reason() {
            return Err(GeminiError::Blocked(reason.to_string()));
        }
        parsed
            .text()
            .filter(|t| !t.trim().is_empty())
            .ok_or(GeminiError::Empty)
    }

    /// Generate a response as a stream of text chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial request fails.
    #[instrument(skip(self, request), fields(model = %self.inner.model, turns = request.contents.len()))]
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
    ) -> Result<impl Stream<Item = Result<String, GeminiError>> + use<>, GeminiError> {
        let response = self
            .inner
            .client
            .post(self.url("streamGenerateContent"))
            .query(&[("alt", "sse")])
            .json(request)
            .send()
            .await?;

        // Check for error responses before streaming
        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_status(status, response).await);
        }

        Ok(stream! {
            use futures::StreamExt;

            // Raw bytes: a multibyte character may straddle two chunks.
            let mut buffer: Vec<u8> = Vec::new();
            let mut byte_stream = std::pin::pin!(response.bytes_stream());

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        // CRLF framing folds to LF.
                        buffer.extend(chunk.iter().filter(|&&b| b != b'\r'));

                        while let Some(event) = extract_sse_event(&mut buffer) {
                            let event = match event {
                                Ok(event) => event,
                                Err(e) => {
                                    yield Err(e);
                                    continue;
                                }
                            };
                            match parse_sse_event(&event) {
                                Some(Ok(chunk)) => {
                                    if let Some(reason) = chunk.block_reason() {
                                        yield Err(GeminiError::Blocked(reason.to_string()));
                                        return;
                                    }
                                    if let Some(text) = chunk.text().filter(|t| !t.is_empty()) {
                                        yield Ok(text);
                                    }
                                }
                                Some(Err(e)) => yield Err(e),
                                None => {}
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(GeminiError::Stream(e.to_string()));
                    }
                }
            }
        })
    }
}

/// Handle an error status code.
async fn handle_error_status(status: reqwest::StatusCode, response: reqwest::Response) -> GeminiError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return GeminiError::RateLimited(retry_after);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return GeminiError::Unauthorized("API key rejected".to_string());
    }

    match response.text().await {
        Ok(body) => match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_error) => GeminiError::Api {
                status: api_error.error.status,
                message: api_error.error.message,
            },
            Err(_) => GeminiError::Api {
                status: status.to_string(),
                message: body,
            },
        },
        Err(e) => GeminiError::Http(e),
    }
}

/// Extract a complete SSE event from the byte buffer.
///
/// Returns `Some(event)` if a complete event was found (and removes it from buffer),
/// or `None` if no complete event is available yet. Only whole events are
/// decoded, so UTF-8 split across network chunks is reassembled first.
fn extract_sse_event(buffer: &mut Vec<u8>) -> Option<Result<String, GeminiError>> {
    let idx = buffer.windows(2).position(|w| w == b"\n\n")?;
    let mut event: Vec<u8> = buffer.drain(..idx + 2).collect();
    event.truncate(idx);
    Some(String::from_utf8(event).map_err(|e| GeminiError::Parse(format!("Invalid UTF-8: {e}"))))
}

/// Parse an SSE event carrying one `GenerateResponse` chunk.
fn parse_sse_event(event: &str) -> Option<Result<GenerateResponse, GeminiError>> {
    if event.trim().is_empty() {
        return None;
    }

    let data: String = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(
        serde_json::from_str::<GenerateResponse>(&data)
            .map_err(|e| GeminiError::Parse(format!("Failed to parse stream chunk: {e}"))),
    )
}

//! Shopping assistant built on Gemini.
//!
//! Conversation history lives in the session, capped at [`MAX_TURNS`]. Every
//! request carries a system prompt with a compact catalog summary so answers
//! can point at products the store actually has in stock.

use askama::Template;
use async_stream::stream;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::Product;
use verdant_core::ChatRole;

use crate::models::session_keys;
use crate::services::cart::CartServiceError;
use crate::services::gemini::{
    Content, GeminiClient, GeminiError, GenerateRequest, GenerationConfig,
};
use crate::state::AppState;

/// Turns of history kept per session.
pub const MAX_TURNS: usize = 20;

/// Longest message a shopper may send, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const RECIPE_COUNT: usize = 3;

/// Errors from the assistant.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// No Gemini key is configured.
    #[error("Assistant unavailable")]
    Disabled,

    #[error("message is empty")]
    EmptyMessage,

    #[error("message is longer than {MAX_MESSAGE_CHARS} characters")]
    TooLong,

    #[error("add something to your cart first")]
    EmptyCart,

    #[error("Gemini error: {0}")]
    Gemini(#[from] GeminiError),

    #[error("cart error: {0}")]
    Cart(#[from] CartServiceError),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Disabled => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            Self::EmptyMessage | Self::TooLong | Self::EmptyCart => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::Gemini(GeminiError::RateLimited(_)) => (
                StatusCode::TOO_MANY_REQUESTS,
                "The assistant is busy, try again in a minute".to_string(),
            ),
            Self::Gemini(GeminiError::Blocked(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "I can't help with that request".to_string(),
            ),
            Self::Gemini(_) | Self::Cart(_) => {
                tracing::error!(error = %self, "Assistant request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "External service error".to_string(),
                )
            }
            Self::Session(_) => {
                sentry::capture_error(&self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// One stored turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    fn content(&self) -> Content {
        Content::text(self.role, self.text.clone())
    }
}

/// Event sent over the assistant's SSE stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    Delta { text: String },
    Done,
    Error { message: String },
}

/// A recipe suggested from cart contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeIdea {
    pub title: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// A product line in the system prompt.
struct CatalogLine {
    name: String,
    /// Price, then unit and category when known.
    details: String,
    stock: u32,
}

impl From<&Product> for CatalogLine {
    fn from(product: &Product) -> Self {
        let details = std::iter::once(product.price.to_string())
            .chain(product.unit.clone())
            .chain(product.category.clone())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: product.name.clone(),
            details,
            stock: product.available(),
        }
    }
}

#[derive(Template)]
#[template(path = "assistant/system_prompt.txt")]
struct SystemPromptTemplate {
    products: Vec<CatalogLine>,
}

#[derive(Template)]
#[template(path = "assistant/recipe_prompt.txt")]
struct RecipePromptTemplate<'a> {
    products: &'a [String],
    count: usize,
}

const FALLBACK_PROMPT: &str = "You are the shopping assistant for Verdant Organics, an organic food store. \
Answer questions about organic food, cooking and the store's products. Keep answers short.";

/// Read the history from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be read.
pub async fn history(session: &Session) -> Result<Vec<ChatTurn>, ChatError> {
    Ok(session
        .get::<Vec<ChatTurn>>(session_keys::ASSISTANT_HISTORY)
        .await?
        .unwrap_or_default())
}

/// Forget the conversation.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn clear_history(session: &Session) -> Result<(), ChatError> {
    session
        .remove::<Vec<ChatTurn>>(session_keys::ASSISTANT_HISTORY)
        .await?;
    Ok(())
}

async fn store_history(session: &Session, turns: Vec<ChatTurn>) -> Result<(), ChatError> {
    session
        .insert(session_keys::ASSISTANT_HISTORY, trim_history(turns))
        .await?;
    Ok(())
}

/// Keep the most recent turns, starting on a user turn.
fn trim_history(mut turns: Vec<ChatTurn>) -> Vec<ChatTurn> {
    if turns.len() > MAX_TURNS {
        turns.drain(..turns.len() - MAX_TURNS);
    }
    let first_user = turns
        .iter()
        .position(|t| t.role == ChatRole::User)
        .unwrap_or(turns.len());
    turns.drain(..first_user);
    turns
}

fn validate_message(message: &str) -> Result<String, ChatError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::TooLong);
    }
    Ok(message.to_string())
}

fn client(state: &AppState) -> Result<GeminiClient, ChatError> {
    state.gemini().cloned().ok_or(ChatError::Disabled)
}

/// Render the system prompt with the current catalog.
///
/// A catalog failure degrades to a prompt without products.
async fn system_prompt(state: &AppState) -> String {
    let products = match state.catalog().summary_products().await {
        Ok(products) => products.iter().map(CatalogLine::from).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Catalog summary unavailable for assistant");
            Vec::new()
        }
    };
    SystemPromptTemplate { products }
        .render()
        .unwrap_or_else(|_| FALLBACK_PROMPT.to_string())
}

async fn build_request(state: &AppState, turns: &[ChatTurn]) -> GenerateRequest {
    GenerateRequest {
        contents: turns.iter().map(ChatTurn::content).collect(),
        system_instruction: Some(Content::system(system_prompt(state).await)),
        generation_config: Some(GenerationConfig {
            temperature: Some(0.7),
            max_output_tokens: Some(1024),
            response_mime_type: None,
        }),
    }
}

/// Send a message and return the whole reply.
///
/// # Errors
///
/// Returns [`ChatError::Disabled`] without a Gemini key, a validation error
/// for bad input, or the Gemini failure.
#[instrument(skip(state, session, message))]
pub async fn send_message(
    state: &AppState,
    session: &Session,
    message: &str,
) -> Result<String, ChatError> {
    let gemini = client(state)?;
    let message = validate_message(message)?;

    let mut turns = history(session).await?;
    turns.push(ChatTurn {
        role: ChatRole::User,
        text: message,
    });
    let turns = trim_history(turns);

    let request = build_request(state, &turns).await;
    let reply = gemini.generate(&request).await?;

    let mut turns = turns;
    turns.push(ChatTurn {
        role: ChatRole::Model,
        text: reply.clone(),
    });
    store_history(session, turns).await?;
    Ok(reply)
}

/// Send a message and stream the reply.
///
/// The user turn is stored before streaming starts; the model turn is stored
/// and the session saved once the stream finishes.
///
/// # Errors
///
/// Returns an error if the assistant is disabled, the message is invalid, or
/// the stream cannot be opened.
#[instrument(skip(state, session, message))]
pub async fn stream_message(
    state: &AppState,
    session: Session,
    message: &str,
) -> Result<impl Stream<Item = ChatStreamEvent> + use<>, ChatError> {
    let gemini = client(state)?;
    let message = validate_message(message)?;

    let mut turns = history(&session).await?;
    turns.push(ChatTurn {
        role: ChatRole::User,
        text: message,
    });
    let turns = trim_history(turns);
    store_history(&session, turns.clone()).await?;

    let request = build_request(state, &turns).await;
    let chunks = gemini.generate_stream(&request).await?;

    Ok(stream! {
        let mut chunks = std::pin::pin!(chunks);
        let mut reply = String::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(text) => {
                    reply.push_str(&text);
                    yield ChatStreamEvent::Delta { text };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Assistant stream failed");
                    yield ChatStreamEvent::Error {
                        message: "The assistant stopped unexpectedly".to_string(),
                    };
                    return;
                }
            }
        }

        if !reply.trim().is_empty() {
            let mut turns = turns;
            turns.push(ChatTurn { role: ChatRole::Model, text: reply });
            if let Err(e) = store_history(&session, turns).await {
                tracing::warn!(error = %e, "Failed to store assistant reply");
            } else if let Err(e) = session.save().await {
                tracing::warn!(error = %e, "Failed to save session after stream");
            }
        }
        yield ChatStreamEvent::Done;
    })
}

/// Suggest recipes that use the given products.
///
/// # Errors
///
/// Returns [`ChatError::EmptyCart`] for an empty list, or the Gemini failure.
#[instrument(skip(state), fields(products = product_names.len()))]
pub async fn recipe_ideas(
    state: &AppState,
    product_names: &[String],
) -> Result<Vec<RecipeIdea>, ChatError> {
    let gemini = client(state)?;
    if product_names.is_empty() {
        return Err(ChatError::EmptyCart);
    }

    let prompt = RecipePromptTemplate {
        products: product_names,
        count: RECIPE_COUNT,
    }
    .render()
    .unwrap_or_else(|_| {
        format!(
            "Suggest {RECIPE_COUNT} recipes using: {}. Answer as a JSON array of objects with title, ingredients and steps.",
            product_names.join(", ")
        )
    });

    let request = GenerateRequest {
        contents: vec![Content::text(ChatRole::User, prompt)],
        system_instruction: Some(Content::system(FALLBACK_PROMPT)),
        generation_config: Some(GenerationConfig {
            temperature: Some(0.9),
            max_output_tokens: Some(2048),
            response_mime_type: Some("application/json".to_string()),
        }),
    };

    let text = gemini.generate(&request).await?;
    Ok(parse_recipes(&text))
}

/// Parse the model's recipe answer.
///
/// Accepts a JSON array, an object with a `recipes` array, or either inside
/// a Markdown code fence. Anything else becomes a single idea holding the
/// raw text.
#[must_use]
pub fn parse_recipes(text: &str) -> Vec<RecipeIdea> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Answer {
        List(Vec<RecipeIdea>),
        Wrapped { recipes: Vec<RecipeIdea> },
    }

    let body = strip_code_fence(text);
    match serde_json::from_str::<Answer>(body) {
        Ok(Answer::List(ideas) | Answer::Wrapped { recipes: ideas }) if !ideas.is_empty() => ideas,
        _ => vec![RecipeIdea {
            title: "Recipe ideas".to_string(),
            ingredients: Vec::new(),
            steps: vec![text.trim().to_string()],
        }],
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn turn(role: ChatRole, text: &str) -> ChatTurn {
        ChatTurn {
            role,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_trim_history_caps_and_starts_with_user() {
        let turns: Vec<ChatTurn> = (0..25)
            .map(|i| {
                let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Model };
                turn(role, &i.to_string())
            })
            .collect();

        let trimmed = trim_history(turns);
        assert!(trimmed.len() <= MAX_TURNS);
        assert_eq!(trimmed[0].role, ChatRole::User);
        assert_eq!(trimmed.last().unwrap().text, "24");
    }

    #[test]
    fn test_validate_message() {
        assert!(matches!(validate_message("   "), Err(ChatError::EmptyMessage)));
        assert!(matches!(
            validate_message(&"a".repeat(MAX_MESSAGE_CHARS + 1)),
            Err(ChatError::TooLong)
        ));
        assert_eq!(validate_message("  kale? ").unwrap(), "kale?");
    }

    #[test]
    fn test_parse_recipes_array_and_wrapped() {
        let array = r#"[{"title":"Honey oat bars","ingredients":["oats","honey"],"steps":["Mix","Bake"]}]"#;
        let ideas = parse_recipes(array);
        assert_eq!(ideas.len(), 1);
        assert_eq!(ideas[0].title, "Honey oat bars");
        assert_eq!(ideas[0].steps, vec!["Mix", "Bake"]);

        let wrapped = "```json\n{\"recipes\":[{\"title\":\"Kale salad\"}]}\n```";
        let ideas = parse_recipes(wrapped);
        assert_eq!(ideas[0].title, "Kale salad");
        assert!(ideas[0].ingredients.is_empty());
    }

    #[test]
    fn test_parse_recipes_falls_back_to_raw_text() {
        let ideas = parse_recipes("Try a warm lentil soup with the spinach.");
        assert_eq!(ideas.len(), 1);
        assert_eq!(ideas[0].title, "Recipe ideas");
        assert_eq!(ideas[0].steps, vec!["Try a warm lentil soup with the spinach."]);

        assert_eq!(parse_recipes("[]")[0].title, "Recipe ideas");
    }

    #[test]
    fn test_system_prompt_lists_products() {
        let prompt = SystemPromptTemplate {
            products: vec![CatalogLine {
                name: "Raw Wildflower Honey".to_string(),
                details: "$12.50, 500 g jar, Honey".to_string(),
                stock: 3,
            }],
        }
        .render()
        .unwrap();
        assert!(prompt.contains("Verdant Organics"));
        assert!(prompt.contains("Raw Wildflower Honey"));
        assert!(prompt.contains("($12.50, 500 g jar, Honey)"));
        assert!(prompt.contains("3 in stock"));
    }

    #[test]
    fn test_stream_events_serialize_with_type_tag() {
        let json = serde_json::to_value(ChatStreamEvent::Delta { text: "Hi".into() }).unwrap();
        assert_eq!(json["type"], "delta");
        assert_eq!(json["text"], "Hi");
        let json = serde_json::to_value(ChatStreamEvent::Done).unwrap();
        assert_eq!(json["type"], "done");
    }

    #[test]
    fn test_disabled_assistant_is_503() {
        let response = ChatError::Disabled.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_history_round_trips_through_session() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        assert!(history(&session).await.unwrap().is_empty());

        store_history(
            &session,
            vec![turn(ChatRole::User, "hi"), turn(ChatRole::Model, "hello")],
        )
        .await
        .unwrap();
        assert_eq!(history(&session).await.unwrap().len(), 2);

        clear_history(&session).await.unwrap();
        assert!(history(&session).await.unwrap().is_empty());
    }
}

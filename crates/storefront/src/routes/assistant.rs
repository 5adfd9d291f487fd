//! Shopping assistant routes.
//!
//! The page renders the stored conversation; the JSON and SSE endpoints are
//! driven by `static/js/app.js`.

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;
use verdant_core::ChatRole;

use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::layout::PageLayout;
use crate::services::{CartService, ChatError, ChatStreamEvent, RecipeIdea, chat};
use crate::state::AppState;

/// A rendered chat bubble.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub from_user: bool,
    pub text: String,
}

/// Assistant page template.
#[derive(Template, WebTemplate)]
#[template(path = "assistant/index.html")]
pub struct AssistantTemplate {
    pub layout: PageLayout,
    pub messages: Vec<MessageView>,
    pub max_chars: usize,
}

/// Chat message request body.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

/// Chat reply body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: String,
}

/// Recipe ideas body.
#[derive(Debug, Serialize)]
pub struct RecipesResponse {
    pub recipes: Vec<RecipeIdea>,
}

/// Display the assistant page.
#[instrument(skip(session, layout))]
pub async fn page(session: Session, layout: PageLayout) -> impl IntoResponse {
    let history = chat::history(&session).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to read assistant history");
        Vec::new()
    });

    AssistantTemplate {
        layout,
        messages: history
            .into_iter()
            .map(|turn| MessageView {
                from_user: turn.role == ChatRole::User,
                text: turn.text,
            })
            .collect(),
        max_chars: chat::MAX_MESSAGE_CHARS,
    }
}

/// Send a message and wait for the whole reply.
#[instrument(skip(state, session, request))]
pub async fn message(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ChatError> {
    let reply = chat::send_message(&state, &session, &request.message).await?;
    Ok(Json(MessageResponse { reply }))
}

/// Send a message and stream the reply as server-sent events.
#[instrument(skip(state, session, request))]
pub async fn stream(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<MessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ChatError> {
    let events = chat::stream_message(&state, session, &request.message).await?;

    let stream = events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| {
            r#"{"type":"error","message":"Serialization failed"}"#.to_string()
        });
        let name = match event {
            ChatStreamEvent::Delta { .. } => "delta",
            ChatStreamEvent::Done => "done",
            ChatStreamEvent::Error { .. } => "error",
        };
        Ok(Event::default().event(name).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Suggest recipes from what is in the cart.
#[instrument(skip(state, session, customer))]
pub async fn recipes(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
) -> Result<Json<RecipesResponse>, ChatError> {
    if state.gemini().is_none() {
        return Err(ChatError::Disabled);
    }

    let snapshot = CartService::new(state.backend(), &session, customer.as_ref())
        .snapshot()
        .await?;
    let names: Vec<String> = snapshot
        .items
        .iter()
        .map(|item| item.product.name.clone())
        .collect();

    let recipes = chat::recipe_ideas(&state, &names).await?;
    Ok(Json(RecipesResponse { recipes }))
}

/// Forget the conversation.
#[instrument(skip(session))]
pub async fn clear(session: Session) -> Result<StatusCode, ChatError> {
    chat::clear_history(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

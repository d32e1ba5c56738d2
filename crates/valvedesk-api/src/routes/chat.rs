use axum::{
    extract::State,
    response::sse::{Event, Sse},
    Json,
};
use bson::oid::ObjectId;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

use valvedesk_engine::{ChatEvent, PreparedTurn, TurnRequest};
use valvedesk_persist::{MessageRole, StoredMessage};

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

const MAX_MESSAGE_CHARS: usize = 10_000;
const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub conversation_title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub role: MessageRole,
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub is_favorite: bool,
}

impl From<StoredMessage> for MessageResponse {
    fn from(message: StoredMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            text: message.text,
            created_at: message.created_at,
            is_favorite: message.is_favorite,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
    pub conversation_id: String,
    pub user_message: MessageResponse,
    pub assistant_message: MessageResponse,
    pub is_new_conversation: bool,
}

/// Send a message and wait for the full turn to complete
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ChatTurnRequest>,
) -> ApiResult<Json<ChatTurnResponse>> {
    let turn = prepare(&state, &user, req).await?;

    let outcome = state.orchestrator.run_turn(turn).await?;

    Ok(Json(ChatTurnResponse {
        conversation_id: outcome.conversation_id.to_hex(),
        user_message: outcome.user_message.into(),
        assistant_message: outcome.assistant_message.into(),
        is_new_conversation: outcome.is_new_conversation,
    }))
}

/// Send a message and stream the response using Server-Sent Events.
///
/// Conversation resolution happens before the stream opens, so a missing or
/// foreign conversation id fails with a plain HTTP status. Everything after
/// that is reported inside the stream.
pub async fn stream_message(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ChatTurnRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let turn = prepare(&state, &user, req).await?;

    let receiver = state.orchestrator.spawn_turn(turn);

    let sse_stream = ReceiverStream::new(receiver).map(|event| {
        let payload = wire_event(event);
        let sse_event = Event::default().json_data(&payload).unwrap_or_else(|e| {
            tracing::error!("Failed to encode stream event: {}", e);
            Event::default().data(r#"{"type":"error","message":"event encoding failed"}"#)
        });
        Ok::<Event, Infallible>(sse_event)
    });

    Ok(Sse::new(sse_stream))
}

#[derive(Debug, Serialize)]
pub struct ChatHealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Health check for the chat service; no authentication required
pub async fn chat_health() -> Json<ChatHealthResponse> {
    Json(ChatHealthResponse {
        status: "healthy".to_string(),
        service: "chat".to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Validate the request and resolve it against the caller's history
async fn prepare(
    state: &AppState,
    user: &CurrentUser,
    req: ChatTurnRequest,
) -> ApiResult<PreparedTurn> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }
    if req.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message exceeds {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    if let Some(title) = &req.conversation_title {
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ApiError::BadRequest(format!(
                "Conversation title exceeds {} characters",
                MAX_TITLE_CHARS
            )));
        }
    }

    let conversation_id = req
        .conversation_id
        .as_deref()
        .map(|id| {
            ObjectId::from_str(id)
                .map_err(|_| ApiError::BadRequest("Invalid conversation ID format".to_string()))
        })
        .transpose()?;

    let history = state.persist.histories().get_or_create(user.id).await?;

    let turn = state
        .orchestrator
        .prepare_turn(TurnRequest {
            history_id: history.id,
            conversation_id,
            title: req.conversation_title,
            user_text: req.message,
            requester_email: user.email.clone(),
        })
        .await?;

    Ok(turn)
}

/// Map an internal event to its wire payload.
///
/// The wire vocabulary is {meta, content, done, error}; tool notices ride
/// as content deltas so clients need no extra handling for them.
fn wire_event(event: ChatEvent) -> serde_json::Value {
    match event {
        ChatEvent::ToolNotice { text } => serde_json::json!({
            "type": "content",
            "delta": text,
        }),
        other => serde_json::to_value(&other).unwrap_or_else(|_| {
            serde_json::json!({
                "type": "error",
                "message": "event encoding failed",
            })
        }),
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use valvedesk_engine::conversation_title;
use valvedesk_persist::{Conversation, ConversationStore};

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiResult},
    routes::chat::MessageResponse,
    state::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub is_pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub message_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
    pub total: u64,
    pub skip: u64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: String,
    pub title: String,
    pub is_pinned: bool,
    pub messages: Vec<MessageResponse>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub is_pinned: bool,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub is_favorite: bool,
}

/// Create an empty conversation
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<CreateConversationResponse>)> {
    let history = state.persist.histories().get_or_create(user.id).await?;

    let title = match req.title {
        Some(title) if !title.trim().is_empty() => title,
        _ => conversation_title(""),
    };

    let conversation = state
        .persist
        .create_conversation(history.id, title)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            conversation_id: conversation.id.to_hex(),
            message: "Conversation created successfully".to_string(),
        }),
    ))
}

/// List the caller's conversations, pinned first, most recent first
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListConversationsResponse>> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

    let history = state.persist.histories().get_or_create(user.id).await?;

    let conversations = state
        .persist
        .conversations()
        .list(history.id, query.skip, limit)
        .await?;
    let total = state.persist.conversations().count(history.id).await?;

    Ok(Json(ListConversationsResponse {
        conversations: conversations.into_iter().map(summarize).collect(),
        total,
        skip: query.skip,
        limit,
    }))
}

/// Get one conversation with its full message list
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<ConversationResponse>> {
    let object_id = parse_object_id(&conversation_id)?;
    let history = state.persist.histories().get_or_create(user.id).await?;

    let conversation = state
        .persist
        .conversations()
        .get(object_id, history.id)
        .await?
        .ok_or(ApiError::ConversationNotFound(conversation_id))?;

    Ok(Json(ConversationResponse {
        id: conversation.id.to_hex(),
        title: conversation.title,
        is_pinned: conversation.is_pinned,
        messages: conversation.messages.into_iter().map(Into::into).collect(),
        created_at: conversation.created_at,
        last_updated: conversation.last_updated,
    }))
}

/// Delete one conversation
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let object_id = parse_object_id(&conversation_id)?;
    let history = state.persist.histories().get_or_create(user.id).await?;

    state
        .persist
        .conversations()
        .delete(object_id, history.id)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Conversation deleted successfully",
        "conversation_id": conversation_id,
    })))
}

/// Delete every conversation the caller owns; the history row itself stays
pub async fn clear_conversations(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    let history = state.persist.histories().get_or_create(user.id).await?;

    let deleted = state
        .persist
        .conversations()
        .delete_all(history.id)
        .await?;
    state.persist.histories().touch(history.id).await?;

    tracing::info!(deleted, "cleared all conversations");

    Ok(Json(serde_json::json!({
        "message": "All conversations cleared successfully",
        "deleted_count": deleted,
    })))
}

/// Toggle pin status for a conversation
pub async fn pin_conversation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(conversation_id): Path<String>,
    Json(req): Json<PinRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let object_id = parse_object_id(&conversation_id)?;
    let history = state.persist.histories().get_or_create(user.id).await?;

    state
        .persist
        .conversations()
        .set_pinned(object_id, history.id, req.is_pinned)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Conversation pin status updated",
        "conversation_id": conversation_id,
        "is_pinned": req.is_pinned,
    })))
}

/// Toggle favorite status for one message in a conversation
pub async fn favorite_message(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Json(req): Json<FavoriteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let object_id = parse_object_id(&conversation_id)?;
    let history = state.persist.histories().get_or_create(user.id).await?;

    state
        .persist
        .conversations()
        .set_message_favorite(object_id, history.id, &message_id, req.is_favorite)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Message favorite status updated",
        "conversation_id": conversation_id,
        "message_id": message_id,
        "is_favorite": req.is_favorite,
    })))
}

pub(crate) fn parse_object_id(id: &str) -> ApiResult<ObjectId> {
    ObjectId::from_str(id)
        .map_err(|_| ApiError::BadRequest("Invalid conversation ID format".to_string()))
}

pub(crate) fn summarize(conversation: Conversation) -> ConversationSummary {
    ConversationSummary {
        id: conversation.id.to_hex(),
        title: conversation.title.clone(),
        is_pinned: conversation.is_pinned,
        preview: conversation.preview(),
        message_count: conversation.messages.len(),
        created_at: conversation.created_at,
        last_updated: conversation.last_updated,
    }
}

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    auth::CurrentUser,
    error::ApiResult,
    routes::conversations::{summarize, ConversationSummary},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history_id: String,
    pub user_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub total_conversations: usize,
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
pub struct MostRecentConversation {
    pub id: String,
    pub title: String,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryStatsResponse {
    pub total_conversations: usize,
    pub total_messages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_recent_conversation: Option<MostRecentConversation>,
    pub history_created_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

/// Full conversation history for the caller; creates the history row on
/// first access
pub async fn get_full_history(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<HistoryResponse>> {
    let history = state.persist.histories().get_or_create(user.id).await?;

    let conversations = state
        .persist
        .conversations()
        .list(history.id, 0, 0)
        .await?;

    let summaries: Vec<ConversationSummary> = conversations.into_iter().map(summarize).collect();

    Ok(Json(HistoryResponse {
        history_id: history.id.to_hex(),
        user_id: history.user_id.to_hex(),
        created_at: history.created_at,
        updated_at: history.updated_at,
        total_conversations: summaries.len(),
        conversations: summaries,
    }))
}

/// Aggregate statistics over the caller's history
pub async fn get_history_stats(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<HistoryStatsResponse>> {
    let history = state.persist.histories().get_or_create(user.id).await?;

    let conversations = state
        .persist
        .conversations()
        .list(history.id, 0, 0)
        .await?;

    let total_messages = conversations.iter().map(|c| c.messages.len()).sum();

    let most_recent = conversations
        .iter()
        .max_by_key(|c| c.last_updated)
        .map(|c| MostRecentConversation {
            id: c.id.to_hex(),
            title: c.title.clone(),
            last_updated: c.last_updated,
        });

    Ok(Json(HistoryStatsResponse {
        total_conversations: conversations.len(),
        total_messages,
        most_recent_conversation: most_recent,
        history_created_at: history.created_at,
        last_activity: history.updated_at,
    }))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use valvedesk_engine::OrchestratorError;
use valvedesk_persist::PersistError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid or missing credentials")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Persistence error: {0}")]
    Persist(PersistError),

    #[error("Generation error: {0}")]
    Generation(#[from] valvedesk_engine::EngineError),

    #[error("Internal server error")]
    Internal,
}

/// Ownership mismatches surface exactly like missing records; only a 404
/// ever leaves this mapping for them.
impl From<PersistError> for ApiError {
    fn from(e: PersistError) -> Self {
        match e {
            PersistError::ConversationNotFound(id) => ApiError::ConversationNotFound(id),
            PersistError::MessageNotFound(id) => ApiError::MessageNotFound(id),
            other => ApiError::Persist(other),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::ConversationNotFound(id) => ApiError::ConversationNotFound(id),
            OrchestratorError::Generation(e) => ApiError::Generation(e),
            OrchestratorError::Persist(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::ConversationNotFound(_) | ApiError::MessageNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ApiError::Persist(ref e) => {
                tracing::error!("Persistence error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            ApiError::Generation(ref e) => {
                tracing::error!("Generation error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Processing error".to_string(),
                )
            }
            ApiError::Internal => {
                tracing::error!("Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_mismatch_maps_to_not_found() {
        let e: ApiError = PersistError::ConversationNotFound("abc".to_string()).into();
        let response = e.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn orchestrator_not_found_keeps_the_conversation_id() {
        let e: ApiError =
            OrchestratorError::ConversationNotFound("665f1c2e".to_string()).into();
        assert_eq!(e.to_string(), "Conversation not found: 665f1c2e");
        assert_eq!(e.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_request_maps_to_400() {
        let response = ApiError::BadRequest("message must not be empty".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

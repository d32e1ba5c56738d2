use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub services: HashMap<String, String>,
}

/// Liveness probe; reports downstream MongoDB reachability
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let mut services = HashMap::new();

    match check_mongodb(&state).await {
        Ok(_) => services.insert("mongodb".to_string(), "connected".to_string()),
        Err(_) => services.insert("mongodb".to_string(), "disconnected".to_string()),
    };

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        service: "valvedesk-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        services,
    }))
}

async fn check_mongodb(state: &AppState) -> ApiResult<()> {
    let probe = bson::oid::ObjectId::new();
    let _ = state.persist.conversations().count(probe).await?;
    Ok(())
}

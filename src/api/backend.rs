use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct BackendTestResponse {
    pub success: bool,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check of the configured backend. A failed check is still a 200
/// with `success: false`.
pub async fn test_backend(State(state): State<AppState>) -> Json<BackendTestResponse> {
    let result = state.backend.health_check(state.options()).await;
    Json(BackendTestResponse {
        success: result.is_ok(),
        backend: state.backend.to_string(),
        error: result.err().map(|err| err.to_string()),
    })
}

//! Liveness endpoint.

use crate::auth::middleware::AppState;
use crate::error::AppError;
use axum::{extract::State, Json};
use serde_json::{json, Value};

const PROBE_KEY: &str = "health:probe";

/// GET /health
///
/// Unguarded. Reports 500 when the shared cache cannot be reached.
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.cache.get(PROBE_KEY).await?;
    Ok(Json(json!({ "status": "ok" })))
}

//! Session inspection endpoints.

use crate::models::{ContextResponse, RequestContext};
use axum::Json;

/// GET /api/session
///
/// Anonymous callers get `authenticated: false`.
pub async fn current_session(context: RequestContext) -> Json<ContextResponse> {
    Json(ContextResponse::from(&context))
}

/// GET /api/profile
pub async fn profile(context: RequestContext) -> Json<ContextResponse> {
    tracing::debug!(source = ?context.source(), "Profile served");
    Json(ContextResponse::from(&context))
}

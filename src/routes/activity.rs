//! Activity actions.

use crate::models::{ContextResponse, RequestContext};
use axum::Json;

/// POST /activity/action
///
/// Reached only with a matching referer (in production) and a fresh `tsp`.
pub async fn perform_action(context: RequestContext) -> Json<ContextResponse> {
    tracing::info!(
        action = "activity_action",
        authenticated = context.is_authenticated(),
        "Activity action accepted"
    );
    Json(ContextResponse::from(&context))
}

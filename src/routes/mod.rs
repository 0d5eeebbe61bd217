//! HTTP routes and their guard chains.

pub mod activity;
pub mod health;
pub mod session;

use crate::auth::middleware::{
    detect_timespan, filter_origin, require_user, resolve_session, AppState,
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

/// Build the router with every route's guards attached.
///
/// Layers added later run first, so each chain is written innermost first.
pub fn api_router(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/api/session", get(session::current_session))
        .layer(from_fn_with_state(state.clone(), detect_timespan))
        .layer(from_fn_with_state(state.clone(), resolve_session));

    let profile_routes = Router::new()
        .route("/api/profile", get(session::profile))
        .layer(from_fn_with_state(state.clone(), detect_timespan))
        .layer(from_fn_with_state(state.clone(), require_user))
        .layer(from_fn_with_state(state.clone(), resolve_session));

    let activity_routes = Router::new()
        .route("/activity/action", post(activity::perform_action))
        .layer(from_fn_with_state(state.clone(), detect_timespan))
        .layer(from_fn_with_state(state.clone(), filter_origin))
        .layer(from_fn_with_state(state.clone(), resolve_session));

    Router::new()
        .route("/health", get(health::health))
        .merge(session_routes)
        .merge(profile_routes)
        .merge(activity_routes)
        .with_state(state)
}

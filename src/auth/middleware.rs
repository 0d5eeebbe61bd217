//! Axum middleware and extractors for the admission chain.
//!
//! Layer order on a route, outermost first:
//! `resolve_session` → `require_user` → `detect_timespan` → handler.
//! `filter_origin` may sit in front of `detect_timespan` on activity routes.

use super::{access, client_ip, cookies, origin, replay, session};
use crate::config::Config;
use crate::error::AppError;
use crate::models::RequestContext;
use crate::storage::{LocalSessionStore, SharedCache};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Application state shared across middleware and handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn SharedCache>,
    pub local_sessions: Arc<LocalSessionStore>,
    pub config: Arc<Config>,
}

/// Request context extractor.
///
/// Reads the context stored by [`resolve_session`]. Fails with 500 if the
/// resolver is not layered on the route.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| {
                AppError::Internal("Request context missing: session resolver not installed".to_string())
            })
    }
}

/// The request target as received: path plus query string.
pub fn request_target(uri: &Uri) -> &str {
    uri.path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path())
}

/// Resolve the caller's login state and attach a [`RequestContext`].
///
/// Redirects to a login page when the token has no live shared session.
pub async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let config = &state.config;
    let headers = request.headers();

    let token = cookies::read_cookie(headers, &config.token_cookie);
    let sid = cookies::read_cookie(headers, &config.local_session_cookie);
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = client_ip::real_client_ip(headers, &config.real_ip_header, peer);

    let resolver = session::SessionResolver::new(
        state.cache.as_ref(),
        &state.local_sessions,
        config.cache_failure_policy,
    );
    let resolved = resolver.resolve(token.as_deref(), sid.as_deref()).await;

    let login = match resolved.resolution {
        session::Resolution::Anonymous => None,
        session::Resolution::Proceed(login) | session::Resolution::Hydrate(login) => Some(login),
        session::Resolution::Reauthenticate => {
            let target = request_target(request.uri());
            let location = session::login_redirect_for(
                target,
                &config.activity_marker,
                &config.login_path,
                &config.activity_login_path,
            );
            tracing::info!(
                action = "login_redirect",
                location = %location,
                ip_hash = %client_ip::ip_hash(client_ip),
                "Session must re-authenticate"
            );
            return AppError::Redirect(location.to_string()).into_response();
        }
    };

    request
        .extensions_mut()
        .insert(RequestContext { login, client_ip });

    let mut response = next.run(request).await;

    if let Some(sid) = resolved.issued_sid {
        let cookie = cookies::session_cookie(
            &config.local_session_cookie,
            &sid,
            state.local_sessions.idle_ttl().as_secs(),
            config.production,
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode session cookie"),
        }
    }

    response
}

/// Redirect anonymous requests to the login page.
pub async fn require_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let context = request.extensions().get::<RequestContext>();
    match access::admit(context, &state.config.login_path) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Reject stale or replayed timestamped requests.
pub async fn detect_timespan(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let target = request_target(request.uri()).to_string();
    let raw_tsp = replay::timestamp_param(request.uri());

    let guard = replay::ReplayGuard::new(
        state.cache.as_ref(),
        state.config.timespan_gap_secs,
        state.config.cache_failure_policy,
    );

    match guard
        .check(&target, raw_tsp.as_deref(), replay::now_millis())
        .await
    {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            match &rejection {
                replay::ReplayRejection::Replayed(_) => {
                    let ip = request
                        .extensions()
                        .get::<RequestContext>()
                        .and_then(|ctx| ctx.client_ip);
                    tracing::warn!(
                        action = "replay_detected",
                        path = %request.uri().path(),
                        ip_hash = %client_ip::ip_hash(ip),
                        "Timestamp already consumed"
                    );
                }
                other => {
                    tracing::debug!(
                        action = "timestamp_rejected",
                        path = %request.uri().path(),
                        reason = %other,
                        "Timestamp rejected"
                    );
                }
            }
            AppError::from(rejection).into_response()
        }
    }
}

/// Reject activity actions whose referer does not come from the login page.
pub async fn filter_origin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let referer = request
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok());

    if origin::referer_allowed(referer, &state.config.origin_referer, state.config.production) {
        next.run(request).await
    } else {
        tracing::debug!(action = "origin_rejected", path = %request.uri().path(), "Referer check failed");
        AppError::Forbidden.into_response()
    }
}

//! Session and request-context models.
//!
//! Session payloads are opaque: they are written to the shared cache by the
//! login flow and carried through unchanged.

use serde::Serialize;
use std::net::IpAddr;

// ============================================================================
// Session Models
// ============================================================================

/// Where the resolved login came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    /// Read from the local session store.
    Local,
    /// Hydrated from the shared cache on this request.
    Shared,
    /// No login (anonymous request).
    None,
}

/// An authenticated identity bound to a client token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSession {
    pub token: String,
    pub payload: String,
    pub source: SessionSource,
}

impl LoginSession {
    /// A session adopted from the shared cache record for `token`.
    pub fn from_shared(token: &str, payload: String) -> Self {
        Self {
            token: token.to_string(),
            payload,
            source: SessionSource::Shared,
        }
    }
}

// ============================================================================
// Request Context
// ============================================================================

/// Per-request state produced by the session resolver.
///
/// Lives in the request extensions; handlers receive it through the
/// `RequestContext` extractor.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub login: Option<LoginSession>,
    pub client_ip: Option<IpAddr>,
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.login.is_some()
    }

    pub fn source(&self) -> SessionSource {
        self.login
            .as_ref()
            .map_or(SessionSource::None, |login| login.source)
    }
}

/// JSON view of a request context.
#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub authenticated: bool,
    pub source: SessionSource,
    pub payload: Option<String>,
    pub client_ip: Option<String>,
}

impl From<&RequestContext> for ContextResponse {
    fn from(ctx: &RequestContext) -> Self {
        Self {
            authenticated: ctx.is_authenticated(),
            source: ctx.source(),
            payload: ctx.login.as_ref().map(|l| l.payload.clone()),
            client_ip: ctx.client_ip.map(|ip| ip.to_string()),
        }
    }
}

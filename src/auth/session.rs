//! Session consistency resolution.
//!
//! A request may carry a token cookie, a local session (from an earlier
//! hydration) and have a record in the shared cache. The shared record is
//! authoritative: a local session whose shared record is gone is stale.
//!
//! | token | local   | shared      | resolution                 |
//! |-------|---------|-------------|----------------------------|
//! | none  | any     | (not read)  | anonymous, local cleared   |
//! | some  | any     | not found   | re-authenticate            |
//! | some  | none    | found       | hydrate local, proceed     |
//! | some  | present | found       | proceed with local         |

use crate::config::FailurePolicy;
use crate::models::LoginSession;
use crate::storage::session::generate_session_id;
use crate::storage::{CacheLookup, LocalSessionStore, SharedCache};

/// Outcome of reconciling a request's session sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No token presented.
    Anonymous,
    /// Local session confirmed by the shared cache.
    Proceed(LoginSession),
    /// Shared record adopted into the local store.
    Hydrate(LoginSession),
    /// Sources disagree; the caller must log in again.
    Reauthenticate,
}

/// Reconcile a presented token's local session against its shared lookup.
///
/// Pure: performs no I/O. With [`FailurePolicy::Open`] an unreachable shared
/// cache keeps a local session that is already held; in every other case an
/// unavailable cache is treated like a missing record.
pub fn reconcile(
    token: &str,
    local: Option<LoginSession>,
    shared: CacheLookup,
    policy: FailurePolicy,
) -> Resolution {
    match (local, shared) {
        (Some(local), CacheLookup::Found(_)) => Resolution::Proceed(local),
        (None, CacheLookup::Found(payload)) => {
            Resolution::Hydrate(LoginSession::from_shared(token, payload))
        }
        (_, CacheLookup::NotFound) => Resolution::Reauthenticate,
        (Some(local), CacheLookup::Unavailable(_)) if policy == FailurePolicy::Open => {
            Resolution::Proceed(local)
        }
        (_, CacheLookup::Unavailable(_)) => Resolution::Reauthenticate,
    }
}

/// Pick the login entry point for a request that must re-authenticate.
///
/// Any request target containing `activity_marker` goes to the activity login.
pub fn login_redirect_for<'a>(
    target: &str,
    activity_marker: &str,
    login_path: &'a str,
    activity_login_path: &'a str,
) -> &'a str {
    if target.contains(activity_marker) {
        activity_login_path
    } else {
        login_path
    }
}

/// Result of running the resolver for one request.
#[derive(Debug)]
pub struct ResolvedSession {
    pub resolution: Resolution,
    /// Local session id minted during hydration; must be sent as a cookie.
    pub issued_sid: Option<String>,
}

/// Resolves a request's login state against the local and shared stores.
pub struct SessionResolver<'a> {
    cache: &'a dyn SharedCache,
    local: &'a LocalSessionStore,
    policy: FailurePolicy,
}

impl<'a> SessionResolver<'a> {
    pub fn new(
        cache: &'a dyn SharedCache,
        local: &'a LocalSessionStore,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            cache,
            local,
            policy,
        }
    }

    /// Resolve the login state for a request.
    ///
    /// `token` is the bearer cookie and `sid` the local session cookie. Never
    /// fails: cache errors are logged and folded into the resolution.
    pub async fn resolve(&self, token: Option<&str>, sid: Option<&str>) -> ResolvedSession {
        let Some(token) = token else {
            if let Some(sid) = sid {
                if self.local.clear(sid).await {
                    tracing::debug!(action = "local_session_cleared", "No token presented");
                }
            }
            return ResolvedSession {
                resolution: Resolution::Anonymous,
                issued_sid: None,
            };
        };

        // A local session minted for another token does not vouch for this one.
        let local = match sid {
            Some(sid) => self.local.get(sid).await.filter(|l| l.token == token),
            None => None,
        };
        let had_local = local.is_some();

        let shared = self.cache.lookup(token).await;
        if let CacheLookup::Unavailable(e) = &shared {
            // Callers see the same outcome as a missing record; operators must not.
            tracing::warn!(
                action = "cache_unavailable",
                stage = "session",
                policy = ?self.policy,
                had_local,
                error = %e,
                "Shared cache lookup failed"
            );
        }

        let resolution = reconcile(token, local, shared, self.policy);
        let mut issued_sid = None;

        match &resolution {
            Resolution::Hydrate(login) => {
                let sid = match sid {
                    Some(sid) => sid.to_string(),
                    None => {
                        let fresh = generate_session_id();
                        issued_sid = Some(fresh.clone());
                        fresh
                    }
                };
                self.local.put(&sid, login.clone()).await;
                tracing::debug!(action = "session_hydrated", "Adopted shared session record");
            }
            Resolution::Reauthenticate => {
                if let Some(sid) = sid {
                    self.local.clear(sid).await;
                }
                tracing::warn!(
                    action = "session_inconsistent",
                    had_local,
                    "Token has no live shared session"
                );
            }
            Resolution::Proceed(_) | Resolution::Anonymous => {}
        }

        ResolvedSession {
            resolution,
            issued_sid,
        }
    }
}

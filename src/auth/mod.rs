//! Admission guards: session resolution, access, replay and origin checks.

pub mod access;
pub mod client_ip;
pub mod cookies;
pub mod middleware;
pub mod origin;
pub mod replay;
pub mod session;

pub use middleware::{detect_timespan, filter_origin, require_user, resolve_session, AppState};
pub use replay::ReplayGuard;
pub use session::{reconcile, Resolution, SessionResolver};

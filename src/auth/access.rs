//! Access guard: only requests with a resolved identity get through.

use crate::error::AppError;
use crate::models::RequestContext;

/// Admit a request if its context carries a login.
///
/// Looks only at the context the session resolver produced; a missing context
/// (resolver not installed) is treated as anonymous.
pub fn admit(context: Option<&RequestContext>, login_path: &str) -> Result<(), AppError> {
    match context {
        Some(ctx) if ctx.is_authenticated() => Ok(()),
        _ => Err(AppError::Redirect(login_path.to_string())),
    }
}

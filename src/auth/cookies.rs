//! Cookie header parsing and `Set-Cookie` construction.

use axum::http::{header::COOKIE, HeaderMap};

/// Read a cookie value by name.
///
/// Scans every `Cookie` header (HTTP/2 clients may send several). Empty values
/// count as absent; surrounding double quotes are stripped.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            if key.trim() != name {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (!value.is_empty()).then(|| value.to_string())
        })
}

/// Build the `Set-Cookie` value for a local session id.
pub fn session_cookie(name: &str, sid: &str, max_age_secs: u64, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{name}={sid}; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age={max_age_secs}")
}

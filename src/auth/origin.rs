//! Referer check for activity actions.
//!
//! Not a security boundary: the `Referer` header is client-controlled. It only
//! keeps casual cross-site posts out in production.

/// Whether a request's referer passes the origin check.
pub fn referer_allowed(referer: Option<&str>, required: &str, production: bool) -> bool {
    if !production {
        return true;
    }
    referer.unwrap_or("").trim().contains(required)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: &str = "http://zhib.net/login";

    #[test]
    fn test_bypassed_outside_production() {
        assert!(referer_allowed(None, REQUIRED, false));
        assert!(referer_allowed(Some("http://evil.example"), REQUIRED, false));
    }

    #[test]
    fn test_production_requires_referer() {
        assert!(!referer_allowed(None, REQUIRED, true));
        assert!(!referer_allowed(Some(""), REQUIRED, true));
        assert!(!referer_allowed(Some("http://evil.example/login"), REQUIRED, true));
    }

    #[test]
    fn test_production_substring_match() {
        assert!(referer_allowed(Some("  http://zhib.net/login?next=/a "), REQUIRED, true));
        assert!(referer_allowed(Some("http://zhib.net/login"), REQUIRED, true));
    }
}

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Shared cache implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

/// What the guards do when the shared cache cannot be reached.
///
/// - `Closed`: the resolver redirects to login, the replay guard answers 403.
/// - `Open`: the resolver keeps a local session it already holds, the replay
///   guard lets the request through without recording a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Closed,
    Open,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" => Ok(FailurePolicy::Closed),
            "open" => Ok(FailurePolicy::Open),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    // Shared cache
    pub cache_backend: CacheBackend,
    pub redis_url: Option<String>,
    pub cache_timeout_ms: u64,
    pub cache_failure_policy: FailurePolicy,

    // Server
    pub bind_addr: SocketAddr,
    pub production: bool,

    // Replay protection
    pub timespan_gap_secs: u64,

    // Cookies
    pub token_cookie: String,
    pub local_session_cookie: String,
    pub local_session_ttl_secs: u64,

    // Maintenance
    pub sweep_interval_secs: u64,

    // Proxy
    pub real_ip_header: String,

    // Redirects
    pub login_path: String,
    pub activity_login_path: String,
    pub activity_marker: String,

    // Origin check
    pub origin_referer: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("cache_backend", &self.cache_backend)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("cache_timeout_ms", &self.cache_timeout_ms)
            .field("cache_failure_policy", &self.cache_failure_policy)
            .field("bind_addr", &self.bind_addr)
            .field("production", &self.production)
            .field("timespan_gap_secs", &self.timespan_gap_secs)
            .field("token_cookie", &self.token_cookie)
            .field("local_session_cookie", &self.local_session_cookie)
            .field("local_session_ttl_secs", &self.local_session_ttl_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("real_ip_header", &self.real_ip_header)
            .field("login_path", &self.login_path)
            .field("activity_login_path", &self.activity_login_path)
            .field("activity_marker", &self.activity_marker)
            .field("origin_referer", &self.origin_referer)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        let _ = dotenvy::dotenv();

        // Shared cache
        let cache_backend = parse_env_or_default("CACHE_BACKEND", CacheBackend::Redis)?;
        let redis_url = match cache_backend {
            // Required to prevent silently running against the wrong store
            CacheBackend::Redis => Some(
                env::var("REDIS_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingVar("REDIS_URL".to_string()))?,
            ),
            CacheBackend::Memory => env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
        };
        let cache_timeout_ms = parse_env_or_default("CACHE_TIMEOUT_MS", 500)?;
        require_positive("CACHE_TIMEOUT_MS", cache_timeout_ms)?;
        let cache_failure_policy =
            parse_env_or_default("CACHE_FAILURE_POLICY", FailurePolicy::Closed)?;

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;
        let production = env::var("APP_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        // Replay protection
        let timespan_gap_secs = parse_env_or_default("TIMESPAN_GAP_SECS", 60)?;
        require_positive("TIMESPAN_GAP_SECS", timespan_gap_secs)?;

        // Cookies
        let token_cookie = env::var("TOKEN_COOKIE").unwrap_or_else(|_| "jwt-did".to_string());
        validate_cookie_name("TOKEN_COOKIE", &token_cookie)?;
        let local_session_cookie =
            env::var("LOCAL_SESSION_COOKIE").unwrap_or_else(|_| "sid".to_string());
        validate_cookie_name("LOCAL_SESSION_COOKIE", &local_session_cookie)?;
        if token_cookie == local_session_cookie {
            return Err(ConfigError::InvalidValue(
                "LOCAL_SESSION_COOKIE".to_string(),
                "must differ from TOKEN_COOKIE".to_string(),
            ));
        }
        let local_session_ttl_secs = parse_env_or_default("LOCAL_SESSION_TTL_SECS", 86_400)?;
        require_positive("LOCAL_SESSION_TTL_SECS", local_session_ttl_secs)?;

        // Maintenance
        let sweep_interval_secs = parse_env_or_default("SWEEP_INTERVAL_SECS", 60)?;
        require_positive("SWEEP_INTERVAL_SECS", sweep_interval_secs)?;

        // Proxy
        let real_ip_header = env::var("REAL_IP_HEADER")
            .unwrap_or_else(|_| "x-real-ip".to_string())
            .trim()
            .to_ascii_lowercase();
        if axum::http::HeaderName::from_bytes(real_ip_header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidValue(
                "REAL_IP_HEADER".to_string(),
                "not a valid header name".to_string(),
            ));
        }

        // Redirects
        let login_path = env::var("LOGIN_PATH").unwrap_or_else(|_| "/login".to_string());
        validate_path("LOGIN_PATH", &login_path)?;
        let activity_login_path =
            env::var("ACTIVITY_LOGIN_PATH").unwrap_or_else(|_| "/activity/login".to_string());
        validate_path("ACTIVITY_LOGIN_PATH", &activity_login_path)?;
        let activity_marker =
            env::var("ACTIVITY_MARKER").unwrap_or_else(|_| "/activity".to_string());
        if activity_marker.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ACTIVITY_MARKER".to_string(),
                "cannot be empty".to_string(),
            ));
        }

        // Origin check
        let origin_referer = env::var("ORIGIN_REFERER")
            .unwrap_or_else(|_| "http://localhost:3000/login".to_string());
        if origin_referer.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "ORIGIN_REFERER".to_string(),
                "cannot be empty".to_string(),
            ));
        }

        Ok(Config {
            cache_backend,
            redis_url,
            cache_timeout_ms,
            cache_failure_policy,
            bind_addr,
            production,
            timespan_gap_secs,
            token_cookie,
            local_session_cookie,
            local_session_ttl_secs,
            sweep_interval_secs,
            real_ip_header,
            login_path,
            activity_login_path,
            activity_marker,
            origin_referer,
        })
    }
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}

fn require_positive(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Cookie names are RFC 6265 tokens: visible ASCII minus separators.
fn validate_cookie_name(key: &str, name: &str) -> Result<(), ConfigError> {
    const SEPARATORS: &str = "()<>@,;:\\\"/[]?={} \t";
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_graphic() && !SEPARATORS.contains(c))
    {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be a non-empty cookie token".to_string(),
        ));
    }
    Ok(())
}

fn validate_path(key: &str, path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') || path.starts_with("//") {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be an absolute path starting with '/'".to_string(),
        ));
    }
    Ok(())
}

//! Timestamp freshness and single-use replay protection.
//!
//! Requests carry a millisecond epoch timestamp in the `tsp` query parameter.
//! A request is admitted when the timestamp is well-formed, within the
//! tolerance window of server time (either direction), and its
//! `(target, tsp)` pair has not been seen during the window.
//!
//! The replay key has no per-request nonce, so two legitimate requests to the
//! same target in the same millisecond are indistinguishable: the second one
//! is acknowledged as a replay.

use crate::config::FailurePolicy;
use crate::error::AppError;
use crate::storage::{CacheError, SharedCache};
use axum::extract::Query;
use axum::http::Uri;
use serde::Deserialize;

/// Value stored under a replay key.
pub const REPLAY_MARKER: &str = "{}";

const TIMESTAMP_DIGITS: usize = 13;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("timestamp parameter missing")]
    Missing,

    #[error("timestamp must be 13 digits, got {0} bytes")]
    Length(usize),

    #[error("timestamp is not an integer")]
    NotNumeric,

    #[error("timestamp is {gap_secs}s from server time, tolerance is {tolerance_secs}s")]
    Stale { gap_secs: i64, tolerance_secs: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayRejection {
    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error("request already consumed: {0}")]
    Replayed(String),

    #[error("replay store unavailable: {0}")]
    Unavailable(#[source] CacheError),
}

impl From<ReplayRejection> for AppError {
    fn from(rejection: ReplayRejection) -> Self {
        match rejection {
            ReplayRejection::Replayed(_) => AppError::AlreadyConsumed,
            ReplayRejection::Timestamp(_) | ReplayRejection::Unavailable(_) => AppError::Forbidden,
        }
    }
}

/// A validated timestamp together with its literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp<'a> {
    pub literal: &'a str,
    pub millis: i64,
}

#[derive(Debug, Deserialize)]
struct TimestampQuery {
    tsp: Option<String>,
}

/// Read the raw `tsp` parameter from a request URI.
///
/// A query string that cannot be decoded (for instance a repeated `tsp`)
/// yields `None`, which the guard rejects as missing.
pub fn timestamp_param(uri: &Uri) -> Option<String> {
    Query::<TimestampQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.tsp)
}

/// Validate the format of a raw timestamp: exactly 13 ASCII digits after trimming.
pub fn parse_timestamp(raw: Option<&str>) -> Result<Timestamp<'_>, TimestampError> {
    let literal = raw.ok_or(TimestampError::Missing)?.trim();

    if literal.len() != TIMESTAMP_DIGITS {
        return Err(TimestampError::Length(literal.len()));
    }
    if !literal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampError::NotNumeric);
    }
    let millis = literal
        .parse::<i64>()
        .map_err(|_| TimestampError::NotNumeric)?;

    Ok(Timestamp { literal, millis })
}

/// Whole seconds between two millisecond instants, truncated toward zero.
pub fn gap_seconds(now_ms: i64, ts_ms: i64) -> i64 {
    (now_ms - ts_ms) / 1000
}

/// Reject timestamps further than `tolerance_secs` from `now_ms`, in either direction.
pub fn check_window(now_ms: i64, ts_ms: i64, tolerance_secs: u64) -> Result<(), TimestampError> {
    let gap_secs = gap_seconds(now_ms, ts_ms);
    if gap_secs.unsigned_abs() > tolerance_secs {
        return Err(TimestampError::Stale {
            gap_secs,
            tolerance_secs,
        });
    }
    Ok(())
}

/// Seconds a replay marker must live so it outlasts the timestamp's validity.
///
/// A timestamp stays acceptable until `ts + tolerance + 1s` (the gap is
/// truncated and the window covers future timestamps too), which can be up to
/// twice the tolerance after `now_ms`.
pub fn marker_ttl_secs(now_ms: i64, ts_ms: i64, tolerance_secs: u64) -> u64 {
    let valid_until = ts_ms.saturating_add((tolerance_secs as i64 + 1) * 1000);
    let remaining_ms = valid_until.saturating_sub(now_ms).max(1000) as u64;
    remaining_ms.div_ceil(1000)
}

/// Replay key for a request target and literal timestamp.
pub fn replay_key(target: &str, timestamp: &str) -> String {
    format!("url_{target}|timespan|timespan_{timestamp}")
}

/// Current server time in epoch milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Validates and consumes request timestamps against the shared cache.
pub struct ReplayGuard<'a> {
    cache: &'a dyn SharedCache,
    tolerance_secs: u64,
    policy: FailurePolicy,
}

impl<'a> ReplayGuard<'a> {
    pub fn new(cache: &'a dyn SharedCache, tolerance_secs: u64, policy: FailurePolicy) -> Self {
        Self {
            cache,
            tolerance_secs,
            policy,
        }
    }

    /// Admit a request to `target` carrying `raw_tsp`, evaluated at `now_ms`.
    ///
    /// Format and staleness are checked before the cache is touched, so an
    /// expired timestamp is rejected whatever the marker state. The marker is
    /// claimed with an atomic set-if-absent that lives until the timestamp
    /// itself goes stale.
    pub async fn check(
        &self,
        target: &str,
        raw_tsp: Option<&str>,
        now_ms: i64,
    ) -> Result<(), ReplayRejection> {
        let ts = parse_timestamp(raw_tsp)?;
        check_window(now_ms, ts.millis, self.tolerance_secs)?;

        let key = replay_key(target, ts.literal);
        let ttl_secs = marker_ttl_secs(now_ms, ts.millis, self.tolerance_secs);
        match self
            .cache
            .set_if_absent(&key, REPLAY_MARKER, ttl_secs)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ReplayRejection::Replayed(key)),
            Err(e) => {
                tracing::warn!(
                    action = "cache_unavailable",
                    stage = "replay",
                    policy = ?self.policy,
                    error = %e,
                    "Replay marker write failed"
                );
                match self.policy {
                    FailurePolicy::Open => Ok(()),
                    FailurePolicy::Closed => Err(ReplayRejection::Unavailable(e)),
                }
            }
        }
    }
}

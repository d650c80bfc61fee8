//! Field bounds and sanitizers for the Cadence wire contract.
//!
//! Every string or number that crosses the wire goes through the same
//! pipeline: trim, truncate to its maximum length, validate, default.
//! The sanitizers are idempotent so re-formatting already-canonical data
//! is a no-op.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Maximum length of a display name or interval name.
pub const MAX_NAME_LENGTH: usize = 50;

/// Maximum length of an alert tag.
pub const MAX_ALERT_LENGTH: usize = 50;

/// Maximum length of an avatar URL.
pub const MAX_AVATAR_URL_LENGTH: usize = 500;

/// Maximum length of a session description.
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Session id length bounds.
pub const MIN_SESSION_ID_LENGTH: usize = 3;
/// Maximum session id length.
pub const MAX_SESSION_ID_LENGTH: usize = 64;

/// Exact length of a client id (UUID v4 textual form).
pub const CLIENT_ID_LENGTH: usize = 36;

/// Interval duration bounds, in seconds.
pub const MIN_DURATION_SECS: i64 = 1;
/// Maximum interval duration (24 hours).
pub const MAX_DURATION_SECS: i64 = 86_400;
/// Default interval duration (25 minutes).
pub const DEFAULT_DURATION_SECS: i64 = 1_500;

/// Default interval duration in milliseconds.
pub const DEFAULT_DURATION_MS: i64 = DEFAULT_DURATION_SECS * 1000;
/// Upper bound for a timer's remaining milliseconds.
pub const MAX_REMAINING_MS: i64 = MAX_DURATION_SECS * 1000;

/// Default alert tag applied when a client sends none.
pub const DEFAULT_ALERT: &str = "Default";

/// Validate a session id against `[a-z0-9-]{3,64}`.
///
/// # Errors
///
/// Returns an error message if the session id is invalid.
pub fn validate_session_id(id: &str) -> Result<(), &'static str> {
    if id.len() < MIN_SESSION_ID_LENGTH {
        return Err("Session id too short");
    }
    if id.len() > MAX_SESSION_ID_LENGTH {
        return Err("Session id too long");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Session id contains invalid characters");
    }
    Ok(())
}

/// Canonicalize a submitted session id: trim, lowercase, validate.
///
/// Returns `None` when the id cannot be made valid.
#[must_use]
pub fn format_session_id(raw: &str) -> Option<String> {
    let id = raw.trim().to_ascii_lowercase();
    validate_session_id(&id).ok().map(|()| id)
}

/// Check whether a string is a plausible client id (36 chars of `[a-f0-9-]`).
#[must_use]
pub fn is_client_id(raw: &str) -> bool {
    raw.len() == CLIENT_ID_LENGTH
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c) || c == '-')
}

/// Canonicalize a submitted client id, minting a fresh UUID v4 when the
/// submitted value is missing or invalid.
#[must_use]
pub fn format_client_id(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(id) if is_client_id(id) => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// Hash a raw client id for the wire.
///
/// Raw client ids are used only for routing inside the broker; peers only
/// ever see the hex SHA-256 of the id.
#[must_use]
pub fn hash_client_id(client_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Trim a string and truncate it to `max` characters.
#[must_use]
pub fn format_text(raw: &str, max: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max).collect()
    }
}

/// Clamp an interval duration into `[1, 86400]` seconds.
#[must_use]
pub fn clamp_duration(secs: i64) -> i64 {
    secs.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
}

/// Clamp a remaining-milliseconds value into `[0, 86_400_000]`.
#[must_use]
pub fn clamp_remaining(ms: i64) -> i64 {
    ms.clamp(0, MAX_REMAINING_MS)
}

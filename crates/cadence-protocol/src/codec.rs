//! Codec for decoding and encoding Cadence wire messages.
//!
//! Decoding is a total function from an untrusted text frame to either a
//! fully sanitized [`ClientMessage`] or an explicit [`CodecError`]. Unknown
//! JSON fields are ignored; every accepted field has been through the
//! trim/truncate/clamp/default pipeline by the time a message is returned.
//! Encoding re-formats outbound payloads so malformed internal state cannot
//! reach peers.

use serde_json::Value;
use thiserror::Error;

use crate::fields::{
    clamp_remaining, format_client_id, format_session_id, DEFAULT_DURATION_SECS,
};
use crate::messages::{
    ClientMessage, Interval, IntervalList, ServerMessage, SessionPatch, TimerState, UserPatch,
};

/// Errors produced while decoding or encoding wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame is not JSON or lacks a `type` field.
    #[error("Invalid message format")]
    InvalidFormat,

    /// The `type` field names no known message.
    #[error("Unknown message type")]
    UnknownType,

    /// A required field failed validation.
    #[error("{0}")]
    Invalid(&'static str),

    /// Serialization failure on the outbound path.
    #[error("Encoding error: {0}")]
    Encode(String),
}

/// Decode a text frame into a sanitized client message.
///
/// # Errors
///
/// Returns [`CodecError::InvalidFormat`] when the frame is not a JSON
/// object with a string `type`, [`CodecError::UnknownType`] for an
/// unrecognized type, and [`CodecError::Invalid`] when a required field
/// fails validation.
pub fn decode(text: &str) -> Result<ClientMessage, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(|_| CodecError::InvalidFormat)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::InvalidFormat)?;

    match kind {
        "session_join" => decode_session_join(&value),
        "session_update" => decode_session_update(&value),
        "timer_update" => Ok(ClientMessage::TimerUpdate {
            timer: sanitize_timer(value.get("timer")),
        }),
        "user_update" => Ok(ClientMessage::UserUpdate {
            user: sanitize_user(value.get("user")),
        }),
        "user_list" => Ok(ClientMessage::UserList),
        "ping" => Ok(ClientMessage::Ping),
        _ => Err(CodecError::UnknownType),
    }
}

/// Encode an outbound message as a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(message: &ServerMessage) -> Result<String, CodecError> {
    serde_json::to_string(&message.formatted()).map_err(|e| CodecError::Encode(e.to_string()))
}

fn decode_session_join(value: &Value) -> Result<ClientMessage, CodecError> {
    let raw_id = value
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or(CodecError::Invalid("Invalid session id"))?;
    let session_id = format_session_id(raw_id).ok_or(CodecError::Invalid("Invalid session id"))?;

    Ok(ClientMessage::SessionJoin {
        session_id,
        session: sanitize_session(value.get("session"), false)?,
        timer: sanitize_timer(value.get("timer")),
        user: sanitize_user(value.get("user")),
    })
}

fn decode_session_update(value: &Value) -> Result<ClientMessage, CodecError> {
    Ok(ClientMessage::SessionUpdate {
        session: sanitize_session(value.get("session"), true)?,
        timer: value
            .get("timer")
            .filter(|t| !t.is_null())
            .map(|t| sanitize_timer(Some(t))),
    })
}

/// Sanitize a `session` payload. With `strict_intervals`, `intervals.items`
/// must be present as an array; without it (the create-or-join path),
/// missing intervals default to an empty list.
fn sanitize_session(value: Option<&Value>, strict_intervals: bool) -> Result<SessionPatch, CodecError> {
    let null = Value::Null;
    let session = value.unwrap_or(&null);

    let intervals = match session.get("intervals") {
        Some(intervals) => {
            let items = match intervals.get("items") {
                Some(Value::Array(items)) => items.iter().map(sanitize_interval).collect(),
                None if !strict_intervals => Vec::new(),
                _ => return Err(CodecError::Invalid("Invalid intervals data")),
            };
            IntervalList {
                last_updated: intervals
                    .get("lastUpdated")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
                items,
            }
        }
        None if !strict_intervals => IntervalList::default(),
        None => return Err(CodecError::Invalid("Invalid intervals data")),
    };

    Ok(SessionPatch {
        name: str_field(session, "name"),
        description: str_field(session, "description"),
        intervals,
    }
    .formatted())
}

fn sanitize_interval(value: &Value) -> Interval {
    Interval {
        name: str_field(value, "name"),
        duration: value
            .get("duration")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_DURATION_SECS),
        alert: str_field(value, "alert"),
        custom_css: str_field(value, "customCSS"),
    }
    .formatted()
}

fn sanitize_timer(value: Option<&Value>) -> TimerState {
    let null = Value::Null;
    let timer = value.unwrap_or(&null);
    let defaults = TimerState::default();

    TimerState {
        repeat: bool_field(timer, "repeat", defaults.repeat),
        interval: timer
            .get("interval")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(defaults.interval),
        remaining: clamp_remaining(
            timer
                .get("remaining")
                .and_then(Value::as_i64)
                .unwrap_or(defaults.remaining),
        ),
        is_running: bool_field(timer, "isRunning", defaults.is_running),
        is_paused: bool_field(timer, "isPaused", defaults.is_paused),
    }
}

fn sanitize_user(value: Option<&Value>) -> UserPatch {
    let null = Value::Null;
    let user = value.unwrap_or(&null);

    UserPatch {
        client_id: format_client_id(user.get("clientId").and_then(Value::as_str)),
        name: str_field(user, "name"),
        avatar_url: str_field(user, "avatarUrl"),
    }
    .formatted()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn bool_field(value: &Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{DEFAULT_DURATION_MS, MAX_REMAINING_MS};

    fn join_frame() -> String {
        r#"{
            "type": "session_join",
            "sessionId": "  Focus-Room  ",
            "session": {
                "name": "Focus Room",
                "description": "Shared deep work",
                "intervals": {
                    "lastUpdated": 1700000000000,
                    "items": [
                        {"name": "Work", "duration": 1500, "alert": "Bell"},
                        {"name": "Break", "duration": 300}
                    ]
                }
            },
            "timer": {"repeat": true, "interval": 0, "remaining": 1500000, "isRunning": false, "isPaused": false},
            "user": {"clientId": "d9428888-122b-11e1-b85c-61cd3cbb3210", "name": "Ada", "avatarUrl": "https://example.com/a.png"}
        }"#
        .to_string()
    }

    #[test]
    fn test_decode_session_join() {
        let msg = decode(&join_frame()).unwrap();
        match msg {
            ClientMessage::SessionJoin {
                session_id,
                session,
                timer,
                user,
            } => {
                assert_eq!(session_id, "focus-room");
                assert_eq!(session.intervals.items.len(), 2);
                assert_eq!(session.intervals.items[1].alert, "Default");
                assert!(timer.repeat);
                assert_eq!(user.client_id, "d9428888-122b-11e1-b85c-61cd3cbb3210");
            }
            other => panic!("Expected SessionJoin, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode("not json"), Err(CodecError::InvalidFormat));
        assert_eq!(decode(r#"{"foo": 1}"#), Err(CodecError::InvalidFormat));
        assert_eq!(
            decode(r#"{"type": "time_travel"}"#),
            Err(CodecError::UnknownType)
        );
    }

    #[test]
    fn test_decode_rejects_bad_session_id() {
        let frame = r#"{"type": "session_join", "sessionId": "x"}"#;
        assert_eq!(decode(frame), Err(CodecError::Invalid("Invalid session id")));
    }

    #[test]
    fn test_session_update_requires_interval_array() {
        let frame = r#"{
            "type": "session_update",
            "session": {"name": "n", "description": "", "intervals": {"items": 42}}
        }"#;
        assert_eq!(
            decode(frame),
            Err(CodecError::Invalid("Invalid intervals data"))
        );

        let frame = r#"{"type": "session_update", "session": {"name": "n"}}"#;
        assert_eq!(
            decode(frame),
            Err(CodecError::Invalid("Invalid intervals data"))
        );
    }

    #[test]
    fn test_join_defaults_missing_payloads() {
        let frame = r#"{"type": "session_join", "sessionId": "focus"}"#;
        match decode(frame).unwrap() {
            ClientMessage::SessionJoin {
                session,
                timer,
                user,
                ..
            } => {
                assert!(session.intervals.items.is_empty());
                assert_eq!(timer, TimerState::default());
                // An invalid client id is replaced, not rejected.
                assert_eq!(user.client_id.len(), 36);
            }
            other => panic!("Expected SessionJoin, got {other:?}"),
        }
    }

    #[test]
    fn test_timer_remaining_is_clamped() {
        let frame = r#"{"type": "timer_update", "timer": {"remaining": 99999999999, "isRunning": true}}"#;
        match decode(frame).unwrap() {
            ClientMessage::TimerUpdate { timer } => {
                assert_eq!(timer.remaining, MAX_REMAINING_MS);
                assert!(timer.is_running);
                assert_eq!(timer.remaining % 1000, 0);
            }
            other => panic!("Expected TimerUpdate, got {other:?}"),
        }

        let frame = r#"{"type": "timer_update", "timer": {"remaining": -10}}"#;
        match decode(frame).unwrap() {
            ClientMessage::TimerUpdate { timer } => assert_eq!(timer.remaining, 0),
            other => panic!("Expected TimerUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_is_idempotent() {
        // Decoding, re-serializing, and decoding again must be a fixpoint.
        let first = decode(&join_frame()).unwrap();
        let reencoded = serde_json::to_string(&first).unwrap();
        let second = decode(&reencoded).unwrap();
        assert_eq!(first, second);
        assert_eq!(serde_json::to_string(&second).unwrap(), reencoded);
    }

    #[test]
    fn test_encode_formats_outbound() {
        let msg = ServerMessage::TimerUpdated {
            session_id: "focus".to_string(),
            timer: TimerState {
                repeat: false,
                interval: 1,
                remaining: -500,
                is_running: true,
                is_paused: false,
            },
        };
        let encoded = encode(&msg).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["timer"]["remaining"], 0);
    }

    #[test]
    fn test_ping_decodes_without_payload() {
        assert_eq!(decode(r#"{"type": "ping"}"#).unwrap(), ClientMessage::Ping);
        assert_eq!(
            decode(r#"{"type": "user_list"}"#).unwrap(),
            ClientMessage::UserList
        );
    }

    #[test]
    fn test_default_timer_remaining() {
        let frame = r#"{"type": "timer_update"}"#;
        match decode(frame).unwrap() {
            ClientMessage::TimerUpdate { timer } => {
                assert_eq!(timer.remaining, DEFAULT_DURATION_MS);
            }
            other => panic!("Expected TimerUpdate, got {other:?}"),
        }
    }
}

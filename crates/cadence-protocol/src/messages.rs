//! Message types for the Cadence wire protocol.
//!
//! Messages are JSON text frames with a required `type` tag. Inbound
//! messages come from clients; outbound messages are produced by the
//! broker. Payload structs carry their formatting rules so malformed
//! internal state can never escape to peers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fields::{
    clamp_duration, clamp_remaining, format_text, DEFAULT_ALERT, DEFAULT_DURATION_MS,
    DEFAULT_DURATION_SECS, MAX_ALERT_LENGTH, MAX_AVATAR_URL_LENGTH, MAX_DESCRIPTION_LENGTH,
    MAX_NAME_LENGTH,
};

/// One ordered step in a session's cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    /// Display name, trimmed to 50 chars.
    pub name: String,
    /// Duration in seconds, clamped to `[1, 86400]`.
    pub duration: i64,
    /// Client-side cue tag.
    pub alert: String,
    /// Opaque styling blob; the broker never inspects it.
    #[serde(rename = "customCSS", default)]
    pub custom_css: String,
}

impl Interval {
    /// Create an interval with the default alert and no custom CSS.
    #[must_use]
    pub fn new(name: impl Into<String>, duration: i64) -> Self {
        Self {
            name: name.into(),
            duration,
            alert: DEFAULT_ALERT.to_string(),
            custom_css: String::new(),
        }
        .formatted()
    }

    /// Apply the field pipeline: trim, truncate, clamp, default.
    #[must_use]
    pub fn formatted(&self) -> Self {
        let alert = format_text(&self.alert, MAX_ALERT_LENGTH);
        Self {
            name: format_text(&self.name, MAX_NAME_LENGTH),
            duration: clamp_duration(self.duration),
            alert: if alert.is_empty() {
                DEFAULT_ALERT.to_string()
            } else {
                alert
            },
            custom_css: self.custom_css.clone(),
        }
    }

    /// Duration of this interval in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        self.duration * 1000
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            name: String::new(),
            duration: DEFAULT_DURATION_SECS,
            alert: DEFAULT_ALERT.to_string(),
            custom_css: String::new(),
        }
    }
}

/// An ordered interval sequence plus its last-writer timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalList {
    /// Wall-clock milliseconds stamped by the last writer.
    pub last_updated: i64,
    /// The ordered steps; may be empty.
    pub items: Vec<Interval>,
}

impl IntervalList {
    #[must_use]
    pub fn formatted(&self) -> Self {
        Self {
            last_updated: self.last_updated.max(0),
            items: self.items.iter().map(Interval::formatted).collect(),
        }
    }
}

/// The public (wire) form of a session's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    /// Wrap to the first interval at end of list instead of stopping.
    pub repeat: bool,
    /// Index of the active interval.
    pub interval: usize,
    /// Milliseconds left in the active interval, clamped to `[0, 86_400_000]`.
    pub remaining: i64,
    /// Whether the timer is running (a paused timer is still running).
    pub is_running: bool,
    /// Only meaningful while running.
    pub is_paused: bool,
}

impl TimerState {
    #[must_use]
    pub fn formatted(&self) -> Self {
        Self {
            remaining: clamp_remaining(self.remaining),
            ..*self
        }
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            repeat: false,
            interval: 0,
            remaining: DEFAULT_DURATION_MS,
            is_running: false,
            is_paused: false,
        }
    }
}

/// Mutable session metadata as submitted by clients and echoed in
/// `session_updated` broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub name: String,
    pub description: String,
    pub intervals: IntervalList,
}

impl SessionPatch {
    #[must_use]
    pub fn formatted(&self) -> Self {
        Self {
            name: format_text(&self.name, MAX_NAME_LENGTH),
            description: format_text(&self.description, MAX_DESCRIPTION_LENGTH),
            intervals: self.intervals.formatted(),
        }
    }
}

/// A client's own profile fields, as submitted on join and profile updates.
///
/// `client_id` here is the raw id the client chose; it never leaves the
/// broker in this form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub client_id: String,
    pub name: String,
    pub avatar_url: String,
}

impl UserPatch {
    #[must_use]
    pub fn formatted(&self) -> Self {
        Self {
            client_id: self.client_id.clone(),
            name: format_text(&self.name, MAX_NAME_LENGTH),
            avatar_url: format_text(&self.avatar_url, MAX_AVATAR_URL_LENGTH),
        }
    }
}

/// The externalized form of a session member.
///
/// `client_id` carries the hex SHA-256 of the raw id, never the id itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub client_id: String,
    pub name: String,
    pub avatar_url: String,
    pub is_online: bool,
    pub last_ping: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_at: Option<i64>,
}

impl UserPublic {
    #[must_use]
    pub fn formatted(&self) -> Self {
        Self {
            client_id: self.client_id.clone(),
            name: format_text(&self.name, MAX_NAME_LENGTH),
            avatar_url: format_text(&self.avatar_url, MAX_AVATAR_URL_LENGTH),
            is_online: self.is_online,
            last_ping: self.last_ping,
            offline_at: self.offline_at,
        }
    }
}

/// The externalized form of a whole session, as delivered by
/// `session_joined` and the HTTP lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPublic {
    pub session_id: String,
    pub name: String,
    pub description: String,
    pub intervals: IntervalList,
    pub timer: TimerState,
    /// Roster keyed by hashed client id.
    pub users: BTreeMap<String, UserPublic>,
    pub created_at: i64,
    pub last_activity: i64,
}

impl SessionPublic {
    #[must_use]
    pub fn formatted(&self) -> Self {
        Self {
            session_id: self.session_id.clone(),
            name: format_text(&self.name, MAX_NAME_LENGTH),
            description: format_text(&self.description, MAX_DESCRIPTION_LENGTH),
            intervals: self.intervals.formatted(),
            timer: self.timer.formatted(),
            users: self
                .users
                .iter()
                .map(|(id, user)| (id.clone(), user.formatted()))
                .collect(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

/// Messages sent by clients to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Create-or-join a session.
    #[serde(rename = "session_join", rename_all = "camelCase")]
    SessionJoin {
        session_id: String,
        session: SessionPatch,
        timer: TimerState,
        user: UserPatch,
    },

    /// Update session metadata and intervals.
    #[serde(rename = "session_update", rename_all = "camelCase")]
    SessionUpdate {
        session: SessionPatch,
        #[serde(skip_serializing_if = "Option::is_none")]
        timer: Option<TimerState>,
    },

    /// Import a peer's timer view (start/pause/stop/next/repeat).
    #[serde(rename = "timer_update", rename_all = "camelCase")]
    TimerUpdate { timer: TimerState },

    /// Update the sender's own profile.
    #[serde(rename = "user_update", rename_all = "camelCase")]
    UserUpdate { user: UserPatch },

    /// Request the full roster.
    #[serde(rename = "user_list")]
    UserList,

    /// Application-level heartbeat.
    #[serde(rename = "ping")]
    Ping,
}

/// Messages sent by the broker to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session_created", rename_all = "camelCase")]
    SessionCreated {
        session_id: String,
        /// Hashed id of the joining client.
        client_id: String,
    },

    #[serde(rename = "session_joined", rename_all = "camelCase")]
    SessionJoined {
        session_id: String,
        client_id: String,
        session: SessionPublic,
    },

    #[serde(rename = "session_updated", rename_all = "camelCase")]
    SessionUpdated {
        session_id: String,
        session: SessionPatch,
    },

    #[serde(rename = "timer_updated", rename_all = "camelCase")]
    TimerUpdated {
        session_id: String,
        timer: TimerState,
    },

    #[serde(rename = "user_connected", rename_all = "camelCase")]
    UserConnected {
        session_id: String,
        user: UserPublic,
    },

    #[serde(rename = "user_disconnected", rename_all = "camelCase")]
    UserDisconnected {
        session_id: String,
        user: UserPublic,
    },

    #[serde(rename = "user_updated", rename_all = "camelCase")]
    UserUpdated {
        session_id: String,
        user: UserPublic,
    },

    #[serde(rename = "users_connected", rename_all = "camelCase")]
    UsersConnected {
        session_id: String,
        users: BTreeMap<String, UserPublic>,
    },

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    /// Build an error reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Run every payload through its formatter.
    #[must_use]
    pub fn formatted(&self) -> Self {
        match self {
            ServerMessage::SessionCreated { .. } | ServerMessage::Pong => self.clone(),
            ServerMessage::SessionJoined {
                session_id,
                client_id,
                session,
            } => ServerMessage::SessionJoined {
                session_id: session_id.clone(),
                client_id: client_id.clone(),
                session: session.formatted(),
            },
            ServerMessage::SessionUpdated {
                session_id,
                session,
            } => ServerMessage::SessionUpdated {
                session_id: session_id.clone(),
                session: session.formatted(),
            },
            ServerMessage::TimerUpdated { session_id, timer } => ServerMessage::TimerUpdated {
                session_id: session_id.clone(),
                timer: timer.formatted(),
            },
            ServerMessage::UserConnected { session_id, user } => ServerMessage::UserConnected {
                session_id: session_id.clone(),
                user: user.formatted(),
            },
            ServerMessage::UserDisconnected { session_id, user } => {
                ServerMessage::UserDisconnected {
                    session_id: session_id.clone(),
                    user: user.formatted(),
                }
            }
            ServerMessage::UserUpdated { session_id, user } => ServerMessage::UserUpdated {
                session_id: session_id.clone(),
                user: user.formatted(),
            },
            ServerMessage::UsersConnected { session_id, users } => ServerMessage::UsersConnected {
                session_id: session_id.clone(),
                users: users
                    .iter()
                    .map(|(id, user)| (id.clone(), user.formatted()))
                    .collect(),
            },
            ServerMessage::Error { message } => ServerMessage::error(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_formatting() {
        let interval = Interval {
            name: "  A very long interval name that should be cut down to size, really  "
                .to_string(),
            duration: 0,
            alert: "   ".to_string(),
            custom_css: ".timer { color: red }".to_string(),
        };
        let formatted = interval.formatted();
        assert_eq!(formatted.name.chars().count(), MAX_NAME_LENGTH);
        assert_eq!(formatted.duration, 1);
        assert_eq!(formatted.alert, DEFAULT_ALERT);
        // Custom CSS is opaque and untouched.
        assert_eq!(formatted.custom_css, interval.custom_css);
    }

    #[test]
    fn test_timer_state_default() {
        let timer = TimerState::default();
        assert_eq!(timer.interval, 0);
        assert_eq!(timer.remaining, DEFAULT_DURATION_MS);
        assert!(!timer.is_running);
    }

    #[test]
    fn test_wire_field_names() {
        let interval = Interval::new("Work", 1500);
        let json = serde_json::to_value(&interval).unwrap();
        assert!(json.get("customCSS").is_some());

        let msg = ServerMessage::TimerUpdated {
            session_id: "focus".to_string(),
            timer: TimerState::default(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "timer_updated");
        assert!(json.get("sessionId").is_some());
        assert!(json["timer"].get("isRunning").is_some());
    }

    #[test]
    fn test_formatted_is_idempotent() {
        let patch = SessionPatch {
            name: "  Focus Room  ".to_string(),
            description: "shared deep-work cycle".to_string(),
            intervals: IntervalList {
                last_updated: -4,
                items: vec![Interval::new("Work", 90_000), Interval::new("Break", 300)],
            },
        };
        let once = patch.formatted();
        assert_eq!(once.formatted(), once);
        assert_eq!(once.intervals.items[0].duration, 86_400);
        assert_eq!(once.intervals.last_updated, 0);
    }
}

//! Session and membership records.
//!
//! A [`Session`] owns its roster and its [`TimerCore`] exclusively. Users
//! hold only outbound socket handles; the transport tasks own the sockets
//! themselves, so a dropped connection shows up here as a closed sender.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;
use tracing::trace;

use cadence_protocol::fields::hash_client_id;
use cadence_protocol::{
    codec, IntervalList, ServerMessage, SessionPatch, SessionPublic, TimerState, UserPatch,
    UserPublic,
};

use crate::clock::SharedClock;
use crate::timer::TimerCore;

/// Identifier of a single transport connection.
pub type SocketId = String;

/// Outbound handle for one socket; carries pre-encoded text frames.
pub type SocketSender = mpsc::UnboundedSender<String>;

/// One participant within a session. A user may hold several sockets
/// (one per open tab).
#[derive(Debug)]
pub struct User {
    /// Raw client id; used for routing only, never externalized.
    pub client_id: String,
    /// Hex SHA-256 of the raw id; the identifier peers see.
    pub hashed_id: String,
    pub name: String,
    pub avatar_url: String,
    /// Live transport connections bound to this user.
    pub sockets: HashMap<SocketId, SocketSender>,
    pub last_ping: i64,
    /// Set when the last socket closed; cleared on reconnect.
    pub offline_at: Option<i64>,
}

impl User {
    /// Create a user from their submitted profile.
    #[must_use]
    pub fn new(patch: &UserPatch, now: i64) -> Self {
        Self {
            hashed_id: hash_client_id(&patch.client_id),
            client_id: patch.client_id.clone(),
            name: patch.name.clone(),
            avatar_url: patch.avatar_url.clone(),
            sockets: HashMap::new(),
            last_ping: now,
            offline_at: None,
        }
    }

    /// Whether any socket of this user is still open.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.sockets.values().any(|sender| !sender.is_closed())
    }

    /// Bind a socket, refreshing liveness bookkeeping.
    pub fn add_socket(&mut self, socket_id: impl Into<SocketId>, sender: SocketSender, now: i64) {
        self.sockets.insert(socket_id.into(), sender);
        self.last_ping = now;
        self.offline_at = None;
    }

    /// Drop a socket. Returns `true` if it was bound to this user.
    pub fn remove_socket(&mut self, socket_id: &str) -> bool {
        self.sockets.remove(socket_id).is_some()
    }

    /// Merge new display fields from a profile update.
    pub fn apply_patch(&mut self, patch: &UserPatch) {
        self.name = patch.name.clone();
        self.avatar_url = patch.avatar_url.clone();
    }

    /// The externalized form carried on the wire.
    #[must_use]
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            client_id: self.hashed_id.clone(),
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
            is_online: self.is_online(),
            last_ping: self.last_ping,
            offline_at: self.offline_at,
        }
    }
}

/// A named room holding an interval list, a timer, and a roster.
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub name: String,
    pub description: String,
    pub intervals: IntervalList,
    pub timer: TimerCore,
    /// Roster keyed by raw client id.
    pub users: HashMap<String, User>,
    pub created_at: i64,
    pub last_activity: i64,
    /// Set while no user has an open socket; the reaper's deadline base.
    pub empty_at: Option<i64>,
}

impl Session {
    /// Create a session from a submitted metadata patch and timer view.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        patch: SessionPatch,
        timer_state: &TimerState,
        clock: SharedClock,
    ) -> Self {
        let now = clock.now_ms();
        let mut timer = TimerCore::new(patch.intervals.items.clone(), clock);
        timer.update_state(timer_state);

        Self {
            session_id: session_id.into(),
            name: patch.name,
            description: patch.description,
            intervals: patch.intervals,
            timer,
            users: HashMap::new(),
            created_at: now,
            last_activity: now,
            empty_at: None,
        }
    }

    /// Overwrite metadata and rebind the timer to the new interval list.
    pub fn apply_update(&mut self, patch: SessionPatch, now: i64) {
        self.name = patch.name;
        self.description = patch.description;
        self.intervals = patch.intervals;
        if self.intervals.last_updated == 0 {
            self.intervals.last_updated = now;
        }
        self.timer.update_intervals(self.intervals.items.clone());
        self.last_activity = now;
    }

    /// The metadata patch echoed in `session_updated` broadcasts.
    #[must_use]
    pub fn to_patch(&self) -> SessionPatch {
        SessionPatch {
            name: self.name.clone(),
            description: self.description.clone(),
            intervals: self.intervals.clone(),
        }
    }

    /// Whether any user has an open socket.
    #[must_use]
    pub fn has_online_user(&self) -> bool {
        self.users.values().any(User::is_online)
    }

    /// Maintain the `empty_at` stamp against the current roster.
    pub fn refresh_empty(&mut self, now: i64) {
        if self.has_online_user() {
            self.empty_at = None;
        } else if self.empty_at.is_none() {
            self.empty_at = Some(now);
        }
    }

    /// The roster in externalized form, keyed by hashed id.
    #[must_use]
    pub fn roster(&self) -> BTreeMap<String, UserPublic> {
        self.users
            .values()
            .map(|user| (user.hashed_id.clone(), user.to_public()))
            .collect()
    }

    /// The full sanitized snapshot, with the timer synced first.
    pub fn to_public(&mut self) -> SessionPublic {
        let timer = self.timer.sync();
        SessionPublic {
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            intervals: self.intervals.clone(),
            timer,
            users: self.roster(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }

    /// Fan a message out to every socket of every user.
    ///
    /// `exclude_socket` removes one connection (usually the sender's);
    /// `ignore_client` removes every socket of one user. Sockets that are
    /// no longer open are skipped silently. Returns the recipient count.
    pub fn broadcast(
        &self,
        message: &ServerMessage,
        exclude_socket: Option<&str>,
        ignore_client: Option<&str>,
    ) -> usize {
        let frame = match codec::encode(message) {
            Ok(frame) => frame,
            Err(_) => return 0,
        };

        let mut recipients = 0;
        for user in self.users.values() {
            if ignore_client == Some(user.client_id.as_str()) {
                continue;
            }
            for (socket_id, sender) in &user.sockets {
                if exclude_socket == Some(socket_id.as_str()) || sender.is_closed() {
                    continue;
                }
                if sender.send(frame.clone()).is_ok() {
                    recipients += 1;
                }
            }
        }

        trace!(session = %self.session_id, recipients, "Broadcast");
        recipients
    }
}

//! The session broker.
//!
//! Owns the session store and drives every mutation: create-or-join,
//! metadata and timer updates, roster maintenance, broadcast fan-out, and
//! the periodic cleanup that promotes silent users to offline and reaps
//! empty sessions. Each session is locked for the duration of one message,
//! which linearizes concurrent writers without a global lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::{Session, SessionHandle, SessionStore, SharedClock, SocketSender, User};
use cadence_protocol::{
    codec, ClientMessage, ServerMessage, SessionPatch, TimerState, UserPatch,
};

use crate::metrics;

/// Per-connection routing state, owned by the transport task.
#[derive(Debug)]
pub struct SocketCtx {
    /// Fresh id minted for this connection.
    pub socket_id: String,
    /// Session this socket has joined, if any.
    pub session_id: Option<String>,
    /// Raw client id bound at join time.
    pub client_id: Option<String>,
    /// Outbound queue for this socket.
    pub sender: SocketSender,
}

impl SocketCtx {
    #[must_use]
    pub fn new(sender: SocketSender) -> Self {
        Self {
            socket_id: Uuid::new_v4().to_string(),
            session_id: None,
            client_id: None,
            sender,
        }
    }
}

/// The session broker.
pub struct Broker {
    store: SessionStore,
    clock: SharedClock,
    /// Ticker period; doubles as the offline-user grace period.
    cleanup_interval_ms: i64,
    /// How long an empty session survives before deletion.
    session_timeout_ms: i64,
}

impl Broker {
    #[must_use]
    pub fn new(clock: SharedClock, cleanup_interval_ms: i64, session_timeout_ms: i64) -> Self {
        Self {
            store: SessionStore::new(),
            clock,
            cleanup_interval_ms,
            session_timeout_ms,
        }
    }

    /// The underlying session store.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Dispatch one decoded inbound message.
    pub async fn handle_message(&self, ctx: &mut SocketCtx, message: ClientMessage) {
        match message {
            ClientMessage::SessionJoin {
                session_id,
                session,
                timer,
                user,
            } => self.handle_join(ctx, session_id, session, timer, user).await,
            ClientMessage::SessionUpdate { session, timer } => {
                self.handle_session_update(ctx, session, timer).await;
            }
            ClientMessage::TimerUpdate { timer } => self.handle_timer_update(ctx, timer).await,
            ClientMessage::UserUpdate { user } => self.handle_user_update(ctx, user).await,
            ClientMessage::UserList => self.handle_user_list(ctx).await,
            // Normally short-circuited by the transport; answered here too
            // so the broker stays total over ClientMessage.
            ClientMessage::Ping => self.reply(ctx, &ServerMessage::Pong),
        }
    }

    /// Create-or-join a session.
    async fn handle_join(
        &self,
        ctx: &mut SocketCtx,
        session_id: String,
        patch: SessionPatch,
        timer: TimerState,
        user_patch: UserPatch,
    ) {
        let now = self.clock.now_ms();

        let (handle, is_new) = match self.store.get(&session_id) {
            Some(handle) => (handle, false),
            None => {
                let session =
                    Session::new(&session_id, patch, &timer, self.clock.clone());
                (self.store.insert(session), true)
            }
        };

        let mut session = handle.lock().await;
        // Re-anchor the session clock before anyone observes it.
        session.timer.sync();

        let client_id = user_patch.client_id.clone();
        let was_online = session
            .users
            .get(&client_id)
            .map(User::is_online)
            .unwrap_or(false);

        let user = session
            .users
            .entry(client_id.clone())
            .or_insert_with(|| User::new(&user_patch, now));
        user.apply_patch(&user_patch);
        user.add_socket(ctx.socket_id.clone(), ctx.sender.clone(), now);
        let user_public = user.to_public();

        session.refresh_empty(now);
        session.last_activity = now;

        ctx.session_id = Some(session_id.clone());
        ctx.client_id = Some(client_id.clone());

        if is_new {
            debug!(session = %session_id, connection = %ctx.socket_id, "Session created");
            self.reply(
                ctx,
                &ServerMessage::SessionCreated {
                    session_id: session_id.clone(),
                    client_id: user_public.client_id.clone(),
                },
            );
        } else {
            debug!(session = %session_id, connection = %ctx.socket_id, "Session joined");
            let snapshot = session.to_public();
            self.reply(
                ctx,
                &ServerMessage::SessionJoined {
                    session_id: session_id.clone(),
                    client_id: user_public.client_id.clone(),
                    session: snapshot,
                },
            );
        }

        // A user opening a second tab is not a new arrival.
        if !was_online {
            session.broadcast(
                &ServerMessage::UserConnected {
                    session_id,
                    user: user_public,
                },
                Some(&ctx.socket_id),
                Some(&client_id),
            );
        }

        metrics::sessions_active(self.store.len());
    }

    /// Overwrite session metadata and intervals.
    async fn handle_session_update(
        &self,
        ctx: &SocketCtx,
        patch: SessionPatch,
        timer: Option<TimerState>,
    ) {
        let Some(handle) = self.resolve(ctx) else {
            self.reply(ctx, &ServerMessage::error("Session not found"));
            return;
        };

        let now = self.clock.now_ms();
        let mut session = handle.lock().await;
        session.apply_update(patch, now);

        if let Some(external) = timer {
            session.timer.update_state(&external);
        }
        let timer_state = session.timer.sync();

        let session_id = session.session_id.clone();
        // Two messages so clients re-render metadata and timer independently.
        session.broadcast(
            &ServerMessage::SessionUpdated {
                session_id: session_id.clone(),
                session: session.to_patch(),
            },
            Some(&ctx.socket_id),
            None,
        );
        session.broadcast(
            &ServerMessage::TimerUpdated {
                session_id,
                timer: timer_state,
            },
            Some(&ctx.socket_id),
            None,
        );
    }

    /// Import a peer's timer view and fan out the post-sync state.
    async fn handle_timer_update(&self, ctx: &SocketCtx, timer: TimerState) {
        let Some(handle) = self.resolve(ctx) else {
            self.reply(ctx, &ServerMessage::error("Session not found"));
            return;
        };

        let mut session = handle.lock().await;
        session.timer.update_state(&timer);
        let timer_state = session.timer.sync();

        session.broadcast(
            &ServerMessage::TimerUpdated {
                session_id: session.session_id.clone(),
                timer: timer_state,
            },
            Some(&ctx.socket_id),
            None,
        );
    }

    /// Update the sender's own profile.
    async fn handle_user_update(&self, ctx: &SocketCtx, patch: UserPatch) {
        let (Some(handle), Some(client_id)) = (self.resolve(ctx), ctx.client_id.as_ref()) else {
            self.reply(ctx, &ServerMessage::error("Session not found"));
            return;
        };

        let now = self.clock.now_ms();
        let mut session = handle.lock().await;
        let Some(user) = session.users.get_mut(client_id) else {
            self.reply(ctx, &ServerMessage::error("Session not found"));
            return;
        };
        user.apply_patch(&patch);
        user.last_ping = now;
        let user_public = user.to_public();

        session.broadcast(
            &ServerMessage::UserUpdated {
                session_id: session.session_id.clone(),
                user: user_public,
            },
            Some(&ctx.socket_id),
            None,
        );
    }

    /// Reply with the full roster; sender only.
    async fn handle_user_list(&self, ctx: &SocketCtx) {
        let Some(handle) = self.resolve(ctx) else {
            self.reply(ctx, &ServerMessage::error("Session not found"));
            return;
        };

        let session = handle.lock().await;
        self.reply(
            ctx,
            &ServerMessage::UsersConnected {
                session_id: session.session_id.clone(),
                users: session.roster(),
            },
        );
    }

    /// Transport adapter callback for a closed socket.
    ///
    /// Drops the socket from its user; when it was the user's last open
    /// socket the user goes offline and peers are told via `user_updated`.
    pub async fn remove_client(&self, ctx: &SocketCtx) {
        let (Some(session_id), Some(client_id)) = (&ctx.session_id, &ctx.client_id) else {
            return;
        };
        let Some(handle) = self.store.get(session_id) else {
            return;
        };

        let now = self.clock.now_ms();
        let mut session = handle.lock().await;

        let went_offline = match session.users.get_mut(client_id) {
            Some(user) => {
                user.remove_socket(&ctx.socket_id);
                if !user.is_online() && user.offline_at.is_none() {
                    user.offline_at = Some(now);
                    Some(user.to_public())
                } else {
                    None
                }
            }
            None => None,
        };

        if let Some(user_public) = went_offline {
            debug!(session = %session_id, connection = %ctx.socket_id, "User went offline");
            session.broadcast(
                &ServerMessage::UserUpdated {
                    session_id: session_id.clone(),
                    user: user_public,
                },
                Some(&ctx.socket_id),
                None,
            );
        }

        session.refresh_empty(now);
    }

    /// One full cleanup pass: offline promotion, user reaping, session
    /// reaping, in that order.
    pub async fn run_cleanup(&self) {
        for (session_id, handle) in self.store.entries() {
            let mut session = handle.lock().await;
            let now = self.clock.now_ms();

            // Promote users whose sockets all closed without a close frame.
            for user in session.users.values_mut() {
                if user.is_online() {
                    user.offline_at = None;
                } else if user.offline_at.is_none() {
                    user.offline_at = Some(now);
                }
            }

            // Reap users offline for longer than the grace period.
            let expired: Vec<String> = session
                .users
                .iter()
                .filter(|(_, user)| {
                    matches!(user.offline_at, Some(at) if now - at > self.cleanup_interval_ms)
                })
                .map(|(client_id, _)| client_id.clone())
                .collect();
            for client_id in expired {
                if let Some(user) = session.users.remove(&client_id) {
                    debug!(session = %session_id, "Reaped offline user");
                    metrics::user_reaped();
                    session.broadcast(
                        &ServerMessage::UserDisconnected {
                            session_id: session_id.clone(),
                            user: user.to_public(),
                        },
                        None,
                        None,
                    );
                }
            }

            session.refresh_empty(now);

            let reap = !session.has_online_user()
                && matches!(session.empty_at, Some(at) if now - at > self.session_timeout_ms);
            drop(session);

            if reap {
                info!(session = %session_id, "Reaping empty session");
                self.store.remove(&session_id);
                metrics::session_reaped();
            }
        }

        metrics::sessions_active(self.store.len());
    }

    /// Spawn the periodic cleanup ticker.
    pub fn spawn_cleanup(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_millis(self.cleanup_interval_ms.max(1) as u64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                self.run_cleanup().await;
            }
        })
    }

    fn resolve(&self, ctx: &SocketCtx) -> Option<SessionHandle> {
        ctx.session_id
            .as_deref()
            .and_then(|session_id| self.store.get(session_id))
    }

    /// Send a message to this socket only.
    fn reply(&self, ctx: &SocketCtx, message: &ServerMessage) {
        match codec::encode(message) {
            Ok(frame) => {
                if ctx.sender.send(frame).is_err() {
                    warn!(connection = %ctx.socket_id, "Reply to closed socket dropped");
                }
            }
            Err(e) => warn!(connection = %ctx.socket_id, error = %e, "Failed to encode reply"),
        }
    }
}

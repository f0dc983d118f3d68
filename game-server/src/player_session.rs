//! The player behind one connection: binds a session id and forwards its actions to the game.

use crate::connection::{ConnectionHandle, DisconnectReason};
use crate::game_session::{Entry, Seat};
use crate::host::SessionHost;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One player, bound to the connection it arrived on.
pub struct PlayerSession {
    connection: ConnectionHandle,
    host: Arc<SessionHost>,
    /// Set once the authority accepted the player, cleared when it leaves.
    session_id: Mutex<Option<String>>,
}

impl PlayerSession {
    /// A session with no player bound yet.
    pub fn new(connection: ConnectionHandle, host: Arc<SessionHost>) -> Self {
        PlayerSession {
            connection,
            host,
            session_id: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// The bound session id, if any.
    pub fn session_id(&self) -> Option<String> {
        self.lock_session_id().clone()
    }

    /// True while a session id is bound.
    pub fn is_valid(&self) -> bool {
        self.lock_session_id().is_some()
    }

    fn lock_session_id(&self) -> MutexGuard<'_, Option<String>> {
        self.session_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles START.
    pub fn player_ready(&self, session_id: &str) {
        let peer = self.connection.peer();
        let mut bound = self.lock_session_id();
        if bound.is_some() {
            tracing::warn!(%peer, session_id, "[PlayerReady Denied] Session id already bound.");
            return;
        }
        if let Err(error) = self.host.accept_player(session_id) {
            tracing::warn!(%peer, session_id, %error, "[PlayerReady Denied] Unauthorized.");
            self.connection.disconnect(DisconnectReason::Unauthorized);
            return;
        }
        let profile = match self.host.describe_player(session_id) {
            Ok(profile) => profile,
            Err(error) => {
                tracing::warn!(%peer, session_id, %error, "[PlayerReady Denied] Player lookup failed.");
                self.host.release_player(session_id);
                self.connection.disconnect(DisconnectReason::Unauthorized);
                return;
            }
        };
        *bound = Some(session_id.to_owned());
        drop(bound);
        tracing::info!(%peer, session_id, name = profile.name, rating = profile.rating, "Player ready.");

        let seat = Seat {
            key: self.connection.id(),
            session_id: session_id.to_owned(),
            name: profile.name,
            rating: profile.rating,
            connection: self.connection.clone(),
        };
        if self.host.game().player_enter(seat) == Entry::Denied {
            tracing::warn!(%peer, session_id, "Player stays unseated.");
        }
    }

    /// Handles EXIT.
    pub fn player_exit(&self, session_id: &str) {
        if self.session_id().as_deref() != Some(session_id) {
            tracing::warn!(session_id, bound = ?self.session_id(), "EXIT with a foreign session id.");
        }
        self.leave();
        self.connection.disconnect(DisconnectReason::Logout);
    }

    /// Handles PUT_STONE.
    pub fn put_stone(&self, x: u32, y: u32) {
        self.host.game().put_stone(self.connection.id(), x, y);
    }

    /// Teardown of the connection, whatever the reason.
    pub fn on_disconnect(&self, reason: DisconnectReason) {
        tracing::debug!(peer = %self.connection.peer(), %reason, "Player session teardown.");
        self.leave();
    }

    /// Runs the leave side effects at most once per bound session id.
    fn leave(&self) {
        let Some(session_id) = self.lock_session_id().take() else {
            return;
        };
        self.host.release_player(&session_id);
        self.host.game().player_leave(self.connection.id());
        self.host.record_leave();
    }
}

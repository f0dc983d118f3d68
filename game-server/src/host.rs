//! Lifecycle of the game server process as seen by its hosting authority.
//!
//! The [`SessionHost`] owns the single [`GameSession`] of the process, admits players only once
//! the session was started and decides when the process should end.

use crate::authority::{AuthorityError, HostingAuthority, PlayerProfile};
use crate::game_session::GameSession;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// A game is always played by exactly this many players.
pub const MAX_PLAYERS_PER_GAME: usize = 2;

/// Why the process ends. Each reason maps to the exit code the supervisor observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Both players left a finished game.
    GameConcluded,
    /// The hosting authority asked for termination.
    Terminated,
    /// Both connections ended without a finished game.
    Abandoned,
}

impl ExitReason {
    pub fn code(self) -> u8 {
        match self {
            ExitReason::GameConcluded => 37,
            // Low byte of 0xDEAD.
            ExitReason::Terminated => 0xAD,
            ExitReason::Abandoned => 1,
        }
    }
}

/// Owns the game of this process and its lifecycle towards the hosting authority.
pub struct SessionHost {
    game: GameSession,
    authority: Arc<dyn HostingAuthority>,
    activated: AtomicBool,
    leave_count: Mutex<usize>,
    shutdown: watch::Sender<Option<ExitReason>>,
    state_file: Option<PathBuf>,
}

impl SessionHost {
    pub fn new(game: GameSession, authority: Arc<dyn HostingAuthority>, state_file: Option<PathBuf>) -> Self {
        let (shutdown, _) = watch::channel(None);
        SessionHost {
            game,
            authority,
            activated: AtomicBool::new(false),
            leave_count: Mutex::new(0),
            shutdown,
            state_file,
        }
    }

    /// The single game of this process.
    pub fn game(&self) -> &GameSession {
        &self.game
    }

    /// The listen port is bound and the process can take a session.
    pub async fn on_process_ready(&self) {
        tracing::info!("Process ready.");
        self.write_state("IDLE").await;
    }

    /// Activates the session. Returns false if it was already active.
    pub async fn on_session_start(&self) -> bool {
        if self.activated.swap(true, Ordering::SeqCst) {
            tracing::warn!("Session start requested twice.");
            return false;
        }
        tracing::info!("Game session started.");
        self.write_state("ACTIVE").await;
        true
    }

    pub fn on_session_update(&self) {
        tracing::info!("Game session update received.");
    }

    pub fn on_health_check(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    /// Forced shutdown. A running game is abandoned and no result is sent.
    pub fn on_terminate(&self) {
        tracing::warn!(status = ?self.game.status(), "Termination requested.");
        self.signal_shutdown(ExitReason::Terminated);
    }

    /// Admits a session id through the authority. Fails before the session was started.
    pub fn accept_player(&self, session_id: &str) -> Result<(), AuthorityError> {
        if !self.on_health_check() {
            return Err(AuthorityError::SessionNotStarted);
        }
        self.authority.accept_player_session(session_id)
    }

    /// Display name and rating behind a session id.
    pub fn describe_player(&self, session_id: &str) -> Result<PlayerProfile, AuthorityError> {
        self.authority.describe_player(session_id)
    }

    /// Hands a session id back to the authority. Failures are only logged.
    pub fn release_player(&self, session_id: &str) {
        match self.authority.remove_player_session(session_id) {
            Ok(()) => tracing::info!(session_id, "Player session released."),
            Err(error) => tracing::warn!(session_id, %error, "Releasing player session failed."),
        }
    }

    /// Counts one player leaving. Once every player of a finished game is gone the process ends.
    pub fn record_leave(&self) {
        let mut leave_count = self.leave_count.lock().unwrap_or_else(PoisonError::into_inner);
        *leave_count += 1;
        tracing::info!(leaves = *leave_count, "Player left.");
        if *leave_count >= MAX_PLAYERS_PER_GAME && self.game.status().is_over() && self.on_health_check() {
            self.signal_shutdown(ExitReason::GameConcluded);
        }
    }

    pub fn leave_count(&self) -> usize {
        *self.leave_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<Option<ExitReason>> {
        self.shutdown.subscribe()
    }

    /// The exit reason once the connections are gone: the signalled one if any, otherwise
    /// decided by whether the game was finished.
    pub fn exit_reason(&self) -> ExitReason {
        if let Some(reason) = *self.shutdown.borrow() {
            return reason;
        }
        if self.game.status().is_over() {
            ExitReason::GameConcluded
        } else {
            ExitReason::Abandoned
        }
    }

    fn signal_shutdown(&self, reason: ExitReason) {
        self.shutdown.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            tracing::info!(?reason, "Shutting down.");
            *current = Some(reason);
            true
        });
    }

    async fn write_state(&self, state: &str) {
        let Some(path) = &self.state_file else {
            return;
        };
        if let Err(error) = tokio::fs::write(path, state).await {
            tracing::warn!(path = %path.display(), %error, "Failed to write state file.");
        }
    }
}

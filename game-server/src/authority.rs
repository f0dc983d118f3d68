//! The hosting authority decides which session ids may play and who is behind them.
//!
//! [`LocalAuthority`] is the stand-in used when the server runs on its own: it admits the
//! session ids of a configured roster, or any session id if the roster is empty.

use crate::config::RosterEntry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Display name and rating of a player, as the authority knows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub name: String,
    pub rating: i32,
}

/// Rejections of the hosting authority.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityError {
    #[error("empty session id")]
    EmptySessionId,
    #[error("unknown session id {0}")]
    UnknownSession(String),
    #[error("session id {0} was already used")]
    AlreadyUsed(String),
    #[error("session id {0} is not active")]
    NotActive(String),
    #[error("game session has not been started")]
    SessionNotStarted,
}

/// The calls the game server makes to its hosting authority.
pub trait HostingAuthority: Send + Sync + 'static {
    /// Validates a session id presented by a client and marks it active.
    fn accept_player_session(&self, session_id: &str) -> Result<(), AuthorityError>;
    /// Marks an active session id as completed.
    fn remove_player_session(&self, session_id: &str) -> Result<(), AuthorityError>;
    /// Looks up who is behind a session id.
    fn describe_player(&self, session_id: &str) -> Result<PlayerProfile, AuthorityError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Completed,
}

/// In-process authority driven by the configured roster.
pub struct LocalAuthority {
    roster: HashMap<String, PlayerProfile>,
    default_rating: i32,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl LocalAuthority {
    pub fn new(roster: &[RosterEntry], default_rating: i32) -> Self {
        let roster = roster
            .iter()
            .map(|entry| {
                let profile = PlayerProfile {
                    name: entry.name.clone(),
                    rating: entry.rating.unwrap_or(default_rating),
                };
                (entry.session_id.clone(), profile)
            })
            .collect();
        LocalAuthority {
            roster,
            default_rating,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn is_known(&self, session_id: &str) -> bool {
        self.roster.is_empty() || self.roster.contains_key(session_id)
    }
}

impl HostingAuthority for LocalAuthority {
    fn accept_player_session(&self, session_id: &str) -> Result<(), AuthorityError> {
        if session_id.is_empty() {
            return Err(AuthorityError::EmptySessionId);
        }
        if !self.is_known(session_id) {
            return Err(AuthorityError::UnknownSession(session_id.to_owned()));
        }
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(session_id) {
            return Err(AuthorityError::AlreadyUsed(session_id.to_owned()));
        }
        sessions.insert(session_id.to_owned(), SessionState::Active);
        Ok(())
    }

    fn remove_player_session(&self, session_id: &str) -> Result<(), AuthorityError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(session_id) {
            Some(state) if *state == SessionState::Active => {
                *state = SessionState::Completed;
                Ok(())
            }
            _ => Err(AuthorityError::NotActive(session_id.to_owned())),
        }
    }

    fn describe_player(&self, session_id: &str) -> Result<PlayerProfile, AuthorityError> {
        if let Some(profile) = self.roster.get(session_id) {
            return Ok(profile.clone());
        }
        if self.roster.is_empty() && !session_id.is_empty() {
            return Ok(PlayerProfile {
                name: session_id.to_owned(),
                rating: self.default_rating,
            });
        }
        Err(AuthorityError::UnknownSession(session_id.to_owned()))
    }
}

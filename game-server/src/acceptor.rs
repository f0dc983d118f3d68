//! Accepts the two player connections of the game and waits for them to end.

use crate::connection::{Connection, ConnectionHandle, ConnectionId};
use crate::error::ServerError;
use crate::host::{MAX_PLAYERS_PER_GAME, SessionHost};
use crate::player_session::PlayerSession;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

pub struct SessionAcceptor {
    listener: TcpListener,
    host: Arc<SessionHost>,
}

impl SessionAcceptor {
    pub async fn bind(addr: &str, host: Arc<SessionHost>) -> Result<SessionAcceptor, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_owned(),
            source,
        })?;
        Ok(SessionAcceptor::from_listener(listener, host))
    }

    pub fn from_listener(listener: TcpListener, host: Arc<SessionHost>) -> SessionAcceptor {
        SessionAcceptor { listener, host }
    }

    /// The address the players connect to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts exactly two connections, then stops accepting and waits for both actors.
    /// The listener stays open until this returns.
    pub async fn run(self) {
        let mut actors = JoinSet::new();
        let mut accepted = 0u64;
        while accepted < MAX_PLAYERS_PER_GAME as u64 {
            let (stream, peer) = match self.listener.accept().await {
                Ok(connection) => connection,
                Err(error) => {
                    tracing::warn!(?error, "Accept failed.");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            accepted += 1;
            if let Err(error) = stream.set_nodelay(true) {
                tracing::warn!(%peer, ?error, "Error when setting nodelay.");
            }
            tracing::info!(%peer, accepted, "Client connected.");

            let (handle, inbox) = ConnectionHandle::new(ConnectionId(accepted), peer);
            let session = Arc::new(PlayerSession::new(handle, self.host.clone()));
            actors.spawn(Connection::new(stream, inbox, session).run());
        }
        tracing::info!("All players connected, accepting no more.");

        while let Some(result) = actors.join_next().await {
            if let Err(error) = result {
                tracing::error!(?error, "Connection task failed.");
            }
        }
        tracing::info!("All connections closed.");
    }
}

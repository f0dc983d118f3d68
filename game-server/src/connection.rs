//! The connection actor: one per accepted TCP connection.
//!
//! The actor owns the socket. It runs three things concurrently within a single task:
//! - **Receive loop**: reads framed packets and dispatches them synchronously to the
//!   [`PlayerSession`].
//! - **Send loop**: writes the packets other contexts queued through the [`ConnectionHandle`].
//! - **Disconnect watch**: waits for a disconnect requested from any context.
//!
//! Whichever finishes first decides the [`DisconnectReason`]. The actor then sets linger to zero,
//! runs the session teardown and closes the socket.

use crate::player_session::PlayerSession;
use bytes::Bytes;
use protocol::{CHANNEL_BUFFER_SIZE, CodecError, HEADER_SIZE, Header, Packet};
use socket2::SockRef;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

/// Identifies one accepted connection for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Malformed, oversized or unexpected packet.
    ActiveError,
    /// The socket failed while reading.
    IoError,
    /// The client closed the connection between packets.
    PeerClosed,
    /// An outbound packet could not be queued or written.
    SendBufferError,
    /// The hosting authority rejected the session id.
    Unauthorized,
    /// The client sent EXIT.
    Logout,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::ActiveError => "active-error",
            DisconnectReason::IoError => "io-error",
            DisconnectReason::PeerClosed => "peer-closed",
            DisconnectReason::SendBufferError => "send-buffer-error",
            DisconnectReason::Unauthorized => "unauthorized",
            DisconnectReason::Logout => "logout",
        };
        f.write_str(text)
    }
}

/// Cloneable access to a connection from other execution contexts.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    disconnect: Arc<watch::Sender<Option<DisconnectReason>>>,
}

/// The receiving ends of a [`ConnectionHandle`], owned by the actor.
pub struct ConnectionInbox {
    outbound: mpsc::Receiver<Bytes>,
    disconnect: watch::Receiver<Option<DisconnectReason>>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, peer: SocketAddr) -> (ConnectionHandle, ConnectionInbox) {
        let (outbound_sender, outbound_receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (disconnect_sender, disconnect_receiver) = watch::channel(None);
        let handle = ConnectionHandle {
            id,
            peer,
            outbound: outbound_sender,
            disconnect: Arc::new(disconnect_sender),
        };
        let inbox = ConnectionInbox {
            outbound: outbound_receiver,
            disconnect: disconnect_receiver,
        };
        (handle, inbox)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues a packet for the send loop. Never blocks; false if the queue is full or the
    /// connection is gone.
    pub fn post_send(&self, packet: Bytes) -> bool {
        match self.outbound.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(peer = %self.peer, "Outbound queue full.");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(peer = %self.peer, "Outbound queue closed.");
                false
            }
        }
    }

    /// Requests the actor to disconnect. Only the first reason sticks.
    pub fn disconnect(&self, reason: DisconnectReason) {
        self.disconnect.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}

impl ConnectionInbox {
    /// Takes every queued packet without waiting.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut packets = Vec::new();
        while let Ok(packet) = self.outbound.try_recv() {
            packets.push(packet);
        }
        packets
    }

    /// The disconnect reason requested so far, if any.
    pub fn requested_disconnect(&self) -> Option<DisconnectReason> {
        *self.disconnect.borrow()
    }
}

/// Errors while reading one packet off the stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the stream at a packet boundary.
    #[error("connection closed")]
    ConnectionClosed,
    /// The stream ended inside a packet.
    #[error("connection closed inside a packet")]
    Truncated,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one framed packet: the 4 byte header, then exactly the payload it declares.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet, FrameError> {
    let mut raw_header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let read = reader.read(&mut raw_header[filled..]).await?;
        if read == 0 {
            return Err(if filled == 0 {
                FrameError::ConnectionClosed
            } else {
                FrameError::Truncated
            });
        }
        filled += read;
    }

    let header = Header::decode(&raw_header)?;
    let mut payload = vec![0u8; header.payload_len()];
    reader.read_exact(&mut payload).await.map_err(|error| {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(error)
        }
    })?;
    Ok(Packet::decode_payload(header.kind, &payload)?)
}

/// The actor of one accepted connection.
pub struct Connection {
    stream: TcpStream,
    inbox: ConnectionInbox,
    session: Arc<PlayerSession>,
}

impl Connection {
    pub fn new(stream: TcpStream, inbox: ConnectionInbox, session: Arc<PlayerSession>) -> Self {
        Connection {
            stream,
            inbox,
            session,
        }
    }

    /// Runs until the connection ends, then tears the session down and closes the socket.
    pub async fn run(self) {
        let Connection {
            stream,
            inbox,
            session,
        } = self;
        let ConnectionInbox {
            mut outbound,
            mut disconnect,
        } = inbox;
        let peer = session.connection().peer();
        let (mut reader, mut writer) = stream.into_split();

        let reason = tokio::select! {
            reason = receive_loop(&mut reader, &session) => reason,
            reason = send_loop(&mut writer, &mut outbound) => reason,
            reason = requested_disconnect(&mut disconnect) => reason,
        };
        // Later requests from other contexts become no-ops.
        session.connection().disconnect(reason);
        tracing::info!(%peer, %reason, "Client disconnected.");

        let stream: &TcpStream = reader.as_ref();
        if let Err(error) = SockRef::from(stream).set_linger(Some(Duration::ZERO)) {
            tracing::warn!(%peer, ?error, "Error when setting linger.");
        }
        session.on_disconnect(reason);
        drop(writer);
        drop(reader);
    }
}

/// Reads and dispatches packets until the stream ends or breaks the protocol.
async fn receive_loop(reader: &mut OwnedReadHalf, session: &PlayerSession) -> DisconnectReason {
    let peer = session.connection().peer();
    loop {
        let packet = match read_packet(reader).await {
            Ok(packet) => packet,
            Err(FrameError::ConnectionClosed) => return DisconnectReason::PeerClosed,
            Err(FrameError::Io(error)) => {
                tracing::debug!(%peer, ?error, "Read failed.");
                return DisconnectReason::IoError;
            }
            Err(error) => {
                tracing::warn!(%peer, %error, "Protocol violation.");
                return DisconnectReason::ActiveError;
            }
        };
        tracing::debug!(%peer, kind = ?packet.kind(), "Packet received.");

        match packet {
            Packet::Start { session_id } => session.player_ready(&session_id),
            Packet::Exit { session_id } => session.player_exit(&session_id),
            Packet::PutStone { x, y } => session.put_stone(x, y),
            Packet::Ping { session_id } => tracing::trace!(%peer, session_id, "Ping."),
            Packet::StartAck { .. } | Packet::BoardStatus(_) => {
                tracing::warn!(%peer, kind = ?packet.kind(), "Server packet received from client.");
                return DisconnectReason::ActiveError;
            }
        }
    }
}

/// Writes queued packets in order. A failed write ends the connection.
async fn send_loop(writer: &mut OwnedWriteHalf, outbound: &mut mpsc::Receiver<Bytes>) -> DisconnectReason {
    while let Some(packet) = outbound.recv().await {
        if let Err(error) = writer.write_all(&packet).await {
            tracing::warn!(?error, "Write error.");
            return DisconnectReason::SendBufferError;
        }
    }
    // Every handle is gone, nothing will be sent any more. Leave the decision to the others.
    std::future::pending().await
}

async fn requested_disconnect(
    disconnect: &mut watch::Receiver<Option<DisconnectReason>>,
) -> DisconnectReason {
    let requested = disconnect
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|reason| *reason);
    match requested {
        Some(reason) => reason,
        None => std::future::pending().await,
    }
}

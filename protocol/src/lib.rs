//! The packet vocabulary spoken between the gomoku server and its clients.
//! It is used consistently across the server and the test clients.
//!
//! Every packet starts with a fixed little-endian header followed by a payload whose layout
//! depends on the packet type:
//!
//! ```text
//! +----------------+----------------+---------------------+
//! | size (u16, LE) | type (u16, LE) | payload             |
//! +----------------+----------------+---------------------+
//! ```
//!
//! `size` covers the header as well as the payload.

use bytes::{BufMut, Bytes, BytesMut};

/// The header is always size + type.
pub const HEADER_SIZE: usize = 4;
/// Width of a padded session id field.
pub const MAX_SESSION_LEN: usize = 128;
/// Width of a padded display name field.
pub const MAX_STRING_LEN: usize = 64;
/// Edge length of the square board.
pub const BOARD_SIZE: usize = 19;
/// Amount of cells on the board.
pub const CELL_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

/// The buffer size for the outbound queue of one connection.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// START, EXIT and PING: header + padded session id.
pub const ID_PACKET_SIZE: usize = HEADER_SIZE + MAX_SESSION_LEN;
/// PUT_STONE: header + x (u32) + y (u32).
pub const PUT_STONE_SIZE: usize = HEADER_SIZE + 8;
/// START_ACK: header + padded session id + padded display name.
pub const START_ACK_SIZE: usize = HEADER_SIZE + MAX_SESSION_LEN + MAX_STRING_LEN;
/// BOARD_STATUS: header + one byte per cell + status byte + turn byte.
pub const BOARD_STATUS_SIZE: usize = HEADER_SIZE + CELL_COUNT + 2;

/// Errors raised while decoding bytes from the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Fewer bytes were handed over than the header or the declared size requires.
    #[error("need {needed} bytes, got {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },
    /// The type code is not one of the enumerated packet types.
    #[error("unknown packet type {0}")]
    UnknownType(u16),
    /// The declared size does not fit the packet type.
    #[error("{kind:?} packet declares size {size}, allowed {min}..={max}")]
    BadSize {
        /// The decoded packet type.
        kind: PacketType,
        /// The declared size.
        size: usize,
        /// Smallest legal size for the type.
        min: usize,
        /// Largest legal size for the type.
        max: usize,
    },
    /// A board cell or turn byte is not a stone value.
    #[error("invalid stone byte {0}")]
    InvalidStone(u8),
    /// The status byte is not a game status value.
    #[error("invalid game status byte {0}")]
    InvalidStatus(u8),
}

/// The packet types. Client -> Server: START, PUT_STONE, EXIT, PING. Server -> Client: START_ACK, BOARD_STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    /// A player presents its session id.
    Start = 1,
    /// Both players are seated, carries first player id and opponent name.
    StartAck = 2,
    /// A player places a stone.
    PutStone = 21,
    /// Full board snapshot after every accepted change.
    BoardStatus = 22,
    /// A player leaves.
    Exit = 31,
    /// Keep-alive, never answered.
    Ping = 41,
}

impl PacketType {
    /// The numeric code used on the wire.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Smallest legal value of the size field for this type.
    pub fn min_size(self) -> usize {
        match self {
            PacketType::Start | PacketType::Exit | PacketType::Ping => HEADER_SIZE,
            PacketType::PutStone => PUT_STONE_SIZE,
            PacketType::StartAck => START_ACK_SIZE,
            PacketType::BoardStatus => BOARD_STATUS_SIZE,
        }
    }

    /// Largest legal value of the size field for this type.
    pub fn max_size(self) -> usize {
        match self {
            PacketType::Start | PacketType::Exit | PacketType::Ping => ID_PACKET_SIZE,
            PacketType::PutStone => PUT_STONE_SIZE,
            PacketType::StartAck => START_ACK_SIZE,
            PacketType::BoardStatus => BOARD_STATUS_SIZE,
        }
    }

    fn check_size(self, size: usize) -> Result<(), CodecError> {
        let (min, max) = (self.min_size(), self.max_size());
        if size < min || size > max {
            return Err(CodecError::BadSize {
                kind: self,
                size,
                min,
                max,
            });
        }
        Ok(())
    }
}

impl TryFrom<u16> for PacketType {
    type Error = CodecError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(PacketType::Start),
            2 => Ok(PacketType::StartAck),
            21 => Ok(PacketType::PutStone),
            22 => Ok(PacketType::BoardStatus),
            31 => Ok(PacketType::Exit),
            41 => Ok(PacketType::Ping),
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

/// Content of a board cell, also used for the color whose turn it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Stone {
    #[default]
    Empty = 0,
    White = 1,
    Black = 2,
}

impl Stone {
    /// The other color. Empty stays empty.
    pub fn opponent(self) -> Stone {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
            Stone::Empty => Stone::Empty,
        }
    }
}

impl TryFrom<u8> for Stone {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Stone::Empty),
            1 => Ok(Stone::White),
            2 => Ok(Stone::Black),
            other => Err(CodecError::InvalidStone(other)),
        }
    }
}

/// Status of a match as reported in the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum GameStatus {
    #[default]
    NotStarted = 0,
    InProgress = 1,
    BlackWins = 2,
    WhiteWins = 3,
}

impl GameStatus {
    /// Terminal states never change again.
    pub fn is_over(self) -> bool {
        matches!(self, GameStatus::BlackWins | GameStatus::WhiteWins)
    }

    /// The terminal status for a win of `stone`.
    pub fn won_by(stone: Stone) -> GameStatus {
        match stone {
            Stone::White => GameStatus::WhiteWins,
            _ => GameStatus::BlackWins,
        }
    }
}

impl TryFrom<u8> for GameStatus {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GameStatus::NotStarted),
            1 => Ok(GameStatus::InProgress),
            2 => Ok(GameStatus::BlackWins),
            3 => Ok(GameStatus::WhiteWins),
            other => Err(CodecError::InvalidStatus(other)),
        }
    }
}

/// The decoded fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total packet size including the header.
    pub size: u16,
    /// The packet type.
    pub kind: PacketType,
}

impl Header {
    /// Decodes and validates the header at the start of `buf`.
    ///
    /// Fails on fewer than [`HEADER_SIZE`] bytes, on a type code outside the enumeration and on a
    /// declared size the type does not allow.
    pub fn decode(buf: &[u8]) -> Result<Header, CodecError> {
        if buf.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }
        let size = u16::from_le_bytes([buf[0], buf[1]]);
        let kind = PacketType::try_from(u16::from_le_bytes([buf[2], buf[3]]))?;
        kind.check_size(size as usize)?;
        Ok(Header { size, kind })
    }

    /// Amount of payload bytes following the header.
    pub fn payload_len(&self) -> usize {
        self.size as usize - HEADER_SIZE
    }
}

/// Payload of a BOARD_STATUS packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardStatus {
    /// All cells, cell (x, y) at index `x * BOARD_SIZE + y`.
    pub cells: Vec<Stone>,
    /// Status of the game after this update.
    pub status: GameStatus,
    /// The color to move next, empty before the game started.
    pub turn: Stone,
}

impl BoardStatus {
    /// The stone at (x, y). Panics for coordinates off the board.
    pub fn cell(&self, x: usize, y: usize) -> Stone {
        self.cells[x * BOARD_SIZE + y]
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Client asks to join the game.
    Start {
        /// Session id issued by the hosting authority.
        session_id: String,
    },
    /// Server tells both players the game started.
    StartAck {
        /// Session id of the black (first) player.
        session_id: String,
        /// Display name of the receiver's opponent.
        opponent_name: String,
    },
    /// Client places a stone of its color.
    PutStone {
        /// Row, `0..BOARD_SIZE` for a valid move.
        x: u32,
        /// Column, `0..BOARD_SIZE` for a valid move.
        y: u32,
    },
    /// Server sends the board after every accepted change.
    BoardStatus(BoardStatus),
    /// Client leaves the game.
    Exit {
        /// Session id the client joined with.
        session_id: String,
    },
    /// Keep-alive, never answered.
    Ping {
        /// Session id the client joined with.
        session_id: String,
    },
}

impl Packet {
    /// The type tag of this packet.
    pub fn kind(&self) -> PacketType {
        match self {
            Packet::Start { .. } => PacketType::Start,
            Packet::StartAck { .. } => PacketType::StartAck,
            Packet::PutStone { .. } => PacketType::PutStone,
            Packet::BoardStatus(_) => PacketType::BoardStatus,
            Packet::Exit { .. } => PacketType::Exit,
            Packet::Ping { .. } => PacketType::Ping,
        }
    }

    /// Encodes the packet with its header. String packets always use the full padded width.
    pub fn encode(&self) -> Bytes {
        let kind = self.kind();
        let size = kind.max_size();
        let mut msg = BytesMut::with_capacity(size);
        msg.put_u16_le(size as u16);
        msg.put_u16_le(kind.code());
        match self {
            Packet::Start { session_id }
            | Packet::Exit { session_id }
            | Packet::Ping { session_id } => put_padded(&mut msg, session_id, MAX_SESSION_LEN),
            Packet::StartAck {
                session_id,
                opponent_name,
            } => {
                put_padded(&mut msg, session_id, MAX_SESSION_LEN);
                put_padded(&mut msg, opponent_name, MAX_STRING_LEN);
            }
            Packet::PutStone { x, y } => {
                msg.put_u32_le(*x);
                msg.put_u32_le(*y);
            }
            Packet::BoardStatus(board) => {
                msg.extend(board.cells.iter().map(|cell| *cell as u8));
                msg.put_u8(board.status as u8);
                msg.put_u8(board.turn as u8);
            }
        }
        msg.freeze()
    }

    /// Decodes one complete packet from the start of `buf`. Trailing bytes are ignored.
    pub fn decode(buf: &[u8]) -> Result<Packet, CodecError> {
        let header = Header::decode(buf)?;
        let end = header.size as usize;
        if buf.len() < end {
            return Err(CodecError::Truncated {
                needed: end,
                available: buf.len(),
            });
        }
        Packet::decode_payload(header.kind, &buf[HEADER_SIZE..end])
    }

    /// Decodes the payload that followed an already validated header.
    pub fn decode_payload(kind: PacketType, payload: &[u8]) -> Result<Packet, CodecError> {
        kind.check_size(HEADER_SIZE + payload.len())?;
        let packet = match kind {
            PacketType::Start => Packet::Start {
                session_id: trim_padded(payload),
            },
            PacketType::Exit => Packet::Exit {
                session_id: trim_padded(payload),
            },
            PacketType::Ping => Packet::Ping {
                session_id: trim_padded(payload),
            },
            PacketType::StartAck => Packet::StartAck {
                session_id: trim_padded(&payload[..MAX_SESSION_LEN]),
                opponent_name: trim_padded(&payload[MAX_SESSION_LEN..]),
            },
            PacketType::PutStone => Packet::PutStone {
                x: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                y: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
            },
            PacketType::BoardStatus => {
                let cells = payload[..CELL_COUNT]
                    .iter()
                    .map(|byte| Stone::try_from(*byte))
                    .collect::<Result<Vec<_>, _>>()?;
                Packet::BoardStatus(BoardStatus {
                    cells,
                    status: GameStatus::try_from(payload[CELL_COUNT])?,
                    turn: Stone::try_from(payload[CELL_COUNT + 1])?,
                })
            }
        };
        Ok(packet)
    }
}

/// Writes `text` into a field of `width` bytes, truncating or padding with NUL.
fn put_padded(msg: &mut BytesMut, text: &str, width: usize) {
    let raw = text.as_bytes();
    let used = raw.len().min(width);
    msg.put_slice(&raw[..used]);
    msg.put_bytes(0, width - used);
}

/// Reads a NUL padded field, dropping the trailing padding.
fn trim_padded(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|byte| *byte != 0).map_or(0, |last| last + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

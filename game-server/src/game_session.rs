//! The authoritative state machine of one match.
//!
//! ```text
//! [NotStarted] --second player enters--> [InProgress] --five in a row / forfeit--> [BlackWins | WhiteWins]
//! ```
//!
//! Both connection actors call into the same [`GameSession`]. Every entry point runs its
//! validation, mutation and broadcast decision under one lock. Outbound packets are only queued
//! on the connections while the lock is held, so both players observe updates in the order
//! they were decided; the socket writes happen in each connection's write loop.

use crate::board::{Board, completes_five};
use crate::connection::{ConnectionHandle, ConnectionId, DisconnectReason};
use crate::rating::{Outcome, rating_delta};
use crate::results::{ResultBatch, ResultDispatcher, ResultRecord};
use protocol::{BoardStatus, GameStatus, Packet, Stone};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A player that entered the game.
#[derive(Clone)]
pub struct Seat {
    /// Identifies the connection that acts for this seat.
    pub key: ConnectionId,
    /// Session id the authority accepted.
    pub session_id: String,
    /// Display name shown to the opponent.
    pub name: String,
    /// The pre-game rating.
    pub rating: i32,
    pub connection: ConnectionHandle,
}

/// Result of [`GameSession::player_enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// Seated as black, waiting for the opponent.
    Black,
    /// Seated as white, the game has started.
    White,
    /// The game is no longer accepting players.
    Denied,
}

/// Why a placement was refused. Denials are logged and never answered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The coordinates are off the board.
    OutOfRange,
    /// The game has not started or is already over.
    NotInProgress,
    /// The connection has no seat in this game.
    NotSeated,
    /// It is the other color's turn.
    WrongTurn,
    /// The cell already holds a stone.
    Occupied,
}

/// Result of [`GameSession::put_stone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The stone was placed and the turn passed on.
    Accepted,
    /// The stone was placed and completed five in a row.
    Won,
    Denied(Denial),
}

/// Everything guarded by the session lock.
#[derive(Default)]
struct MatchState {
    board: Board,
    status: GameStatus,
    turn: Stone,
    black: Option<Seat>,
    white: Option<Seat>,
}

impl MatchState {
    fn color_of(&self, key: ConnectionId) -> Option<Stone> {
        if self.black.as_ref().is_some_and(|seat| seat.key == key) {
            Some(Stone::Black)
        } else if self.white.as_ref().is_some_and(|seat| seat.key == key) {
            Some(Stone::White)
        } else {
            None
        }
    }

    fn snapshot(&self) -> BoardStatus {
        BoardStatus {
            cells: self.board.cells().to_vec(),
            status: self.status,
            turn: self.turn,
        }
    }

    /// Queues the board on both seats. A seat whose queue does not take it gets disconnected.
    fn broadcast_board(&self) {
        let packet = Packet::BoardStatus(self.snapshot()).encode();
        for seat in [&self.black, &self.white].into_iter().flatten() {
            post_or_disconnect(&seat.connection, packet.clone());
        }
    }
}

fn post_or_disconnect(connection: &ConnectionHandle, packet: bytes::Bytes) {
    if !connection.post_send(packet) {
        connection.disconnect(DisconnectReason::SendBufferError);
    }
}

/// The shared game of this process.
pub struct GameSession {
    state: Mutex<MatchState>,
    dispatcher: ResultDispatcher,
}

impl GameSession {
    /// An empty game that reports its result through `dispatcher`.
    pub fn new(dispatcher: ResultDispatcher) -> Self {
        GameSession {
            state: Mutex::new(MatchState::default()),
            dispatcher,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seats a player. The first one becomes black, the second one white, which starts the game
    /// and sends START_ACK to both.
    pub fn player_enter(&self, seat: Seat) -> Entry {
        let mut state = self.lock();
        if state.status != GameStatus::NotStarted {
            tracing::warn!(session_id = seat.session_id, "[PlayerEnter Denied] Game has already started.");
            return Entry::Denied;
        }
        let Some(black) = state.black.clone() else {
            tracing::info!(session_id = seat.session_id, "Player seated as black.");
            state.black = Some(seat);
            return Entry::Black;
        };

        tracing::info!(session_id = seat.session_id, "Player seated as white, game starts.");
        state.status = GameStatus::InProgress;
        state.turn = Stone::Black;

        let to_black = Packet::StartAck {
            session_id: black.session_id.clone(),
            opponent_name: seat.name.clone(),
        };
        let to_white = Packet::StartAck {
            session_id: black.session_id.clone(),
            opponent_name: black.name.clone(),
        };
        post_or_disconnect(&black.connection, to_black.encode());
        post_or_disconnect(&seat.connection, to_white.encode());
        state.white = Some(seat);
        Entry::White
    }

    /// A seated player left. During a running game the opponent wins by forfeit, otherwise
    /// nothing happens. Returns true on a forfeit.
    pub fn player_leave(&self, key: ConnectionId) -> bool {
        let mut state = self.lock();
        if state.status != GameStatus::InProgress {
            return false;
        }
        let Some(leaver) = state.color_of(key) else {
            return false;
        };
        let winner = leaver.opponent();
        tracing::info!(?leaver, ?winner, "Player left a running game, forfeit.");
        self.finish(&mut state, winner);
        state.broadcast_board();
        true
    }

    /// Places a stone for the player behind `key`. Every denial leaves the board and the turn
    /// untouched and sends nothing.
    pub fn put_stone(&self, key: ConnectionId, x: u32, y: u32) -> Placement {
        let Some((x, y)) = Board::locate(x, y) else {
            tracing::warn!(?key, x, y, "[PutStone Denied] out of range");
            return Placement::Denied(Denial::OutOfRange);
        };

        let mut state = self.lock();
        if state.status != GameStatus::InProgress {
            tracing::warn!(?key, "[PutStone Denied] Not started game");
            return Placement::Denied(Denial::NotInProgress);
        }
        let Some(stone) = state.color_of(key) else {
            tracing::warn!(?key, "[PutStone Denied] not seated");
            return Placement::Denied(Denial::NotSeated);
        };
        if stone != state.turn {
            tracing::warn!(?key, ?stone, "[PutStone Denied] Turn mismatch");
            return Placement::Denied(Denial::WrongTurn);
        }
        if !state.board.place(x, y, stone) {
            tracing::warn!(?key, x, y, "[PutStone Denied] wrong position");
            return Placement::Denied(Denial::Occupied);
        }
        tracing::debug!(?stone, x, y, "Stone placed.");

        let won = completes_five(&state.board, x, y, stone);
        if won {
            self.finish(&mut state, stone);
        }
        state.turn = stone.opponent();
        state.broadcast_board();
        if won { Placement::Won } else { Placement::Accepted }
    }

    /// Moves into the terminal state for `winner` and hands the results off.
    fn finish(&self, state: &mut MatchState, winner: Stone) {
        state.status = GameStatus::won_by(winner);
        let (Some(black), Some(white)) = (&state.black, &state.white) else {
            tracing::error!("Game finished without two seated players, no result sent.");
            return;
        };
        let winner_seat = if winner == Stone::Black { black } else { white };
        tracing::info!(session_id = winner_seat.session_id, "[GAME OVER] Player wins!");
        self.dispatcher.dispatch(result_batch(black, white, winner));
    }

    /// The current game status.
    pub fn status(&self) -> GameStatus {
        self.lock().status
    }

    /// The board as it would go out in BOARD_STATUS.
    pub fn snapshot(&self) -> BoardStatus {
        self.lock().snapshot()
    }

    /// One line view of the game for the admin surface.
    pub fn summary(&self) -> SessionSummary {
        let state = self.lock();
        SessionSummary {
            status: state.status,
            turn: state.turn,
            black: state.black.as_ref().map(|seat| seat.name.clone()),
            white: state.white.as_ref().map(|seat| seat.name.clone()),
            stones: state.board.stone_count(),
        }
    }

    /// Waits for the result delivery of a finished game, if one was started.
    pub async fn flush_results(&self) {
        self.dispatcher.flush().await;
    }
}

fn result_batch(black: &Seat, white: &Seat, winner: Stone) -> ResultBatch {
    let black_outcome = if winner == Stone::Black { Outcome::Win } else { Outcome::Loss };
    let white_outcome = if winner == Stone::White { Outcome::Win } else { Outcome::Loss };
    [
        result_record(black, white.rating, black_outcome),
        result_record(white, black.rating, white_outcome),
    ]
}

fn result_record(seat: &Seat, opponent_rating: i32, outcome: Outcome) -> ResultRecord {
    ResultRecord {
        player_name: seat.name.clone(),
        rating_delta: rating_delta(seat.rating, opponent_rating, outcome),
        win_delta: u32::from(outcome == Outcome::Win),
        lose_delta: u32::from(outcome == Outcome::Loss),
    }
}

/// Snapshot for the admin surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub status: GameStatus,
    pub turn: Stone,
    pub black: Option<String>,
    pub white: Option<String>,
    pub stones: usize,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Status: {:?}  Turn: {:?}  Black: {}  White: {}  Stones: {:03}",
            self.status,
            self.turn,
            self.black.as_deref().unwrap_or("-"),
            self.white.as_deref().unwrap_or("-"),
            self.stones
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionInbox;
    use crate::results::{ResultSink, SinkError};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<ResultRecord>>,
    }

    impl ResultSink for MemorySink {
        fn deliver(&self, batch: &ResultBatch) -> Result<(), SinkError> {
            self.records.lock().unwrap().extend(batch.iter().cloned());
            Ok(())
        }
    }

    impl MemorySink {
        async fn wait_for(&self, count: usize) -> Vec<ResultRecord> {
            for _ in 0..100 {
                let records = self.records.lock().unwrap().clone();
                if records.len() >= count {
                    return records;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("results were not delivered");
        }
    }

    struct Player {
        key: ConnectionId,
        connection: ConnectionHandle,
        inbox: ConnectionInbox,
    }

    impl Player {
        fn last_board(&mut self) -> Option<BoardStatus> {
            self.inbox
                .drain()
                .into_iter()
                .filter_map(|raw| match Packet::decode(&raw) {
                    Ok(Packet::BoardStatus(board)) => Some(board),
                    _ => None,
                })
                .last()
        }
    }

    fn seat(id: u64, name: &str, rating: i32) -> (Seat, Player) {
        let key = ConnectionId(id);
        let (connection, inbox) = ConnectionHandle::new(key, "127.0.0.1:1".parse().unwrap());
        let seat = Seat {
            key,
            session_id: format!("psess-{id}"),
            name: name.into(),
            rating,
            connection: connection.clone(),
        };
        (seat, Player { key, connection, inbox })
    }

    fn started_game() -> (GameSession, Arc<MemorySink>, Player, Player) {
        let sink = Arc::new(MemorySink::default());
        let game = GameSession::new(ResultDispatcher::new(sink.clone()));
        let (black_seat, black) = seat(1, "alice", 1000);
        let (white_seat, white) = seat(2, "bob", 1000);
        assert_eq!(game.player_enter(black_seat), Entry::Black);
        assert_eq!(game.player_enter(white_seat), Entry::White);
        (game, sink, black, white)
    }

    #[test]
    fn test_second_player_starts_game() {
        let sink = Arc::new(MemorySink::default());
        let game = GameSession::new(ResultDispatcher::new(sink));
        let (black_seat, mut black) = seat(1, "alice", 1000);
        let (white_seat, mut white) = seat(2, "bob", 1000);

        assert_eq!(game.player_enter(black_seat), Entry::Black);
        assert_eq!(game.status(), GameStatus::NotStarted);
        assert!(black.inbox.drain().is_empty());

        assert_eq!(game.player_enter(white_seat), Entry::White);
        assert_eq!(game.status(), GameStatus::InProgress);
        assert_eq!(game.snapshot().turn, Stone::Black);

        let to_black = Packet::decode(&black.inbox.drain()[0]).unwrap();
        let to_white = Packet::decode(&white.inbox.drain()[0]).unwrap();
        assert_eq!(
            to_black,
            Packet::StartAck {
                session_id: "psess-1".into(),
                opponent_name: "bob".into()
            }
        );
        assert_eq!(
            to_white,
            Packet::StartAck {
                session_id: "psess-1".into(),
                opponent_name: "alice".into()
            }
        );
    }

    #[test]
    fn test_third_player_denied() {
        let (game, _sink, _black, _white) = started_game();
        let (late, _late) = seat(3, "carol", 1000);
        assert_eq!(game.player_enter(late), Entry::Denied);
    }

    #[test]
    fn test_turns_alternate_and_denials_keep_turn() {
        let (game, _sink, mut black, mut white) = started_game();

        assert_eq!(game.put_stone(white.key, 0, 0), Placement::Denied(Denial::WrongTurn));
        assert_eq!(game.snapshot().turn, Stone::Black);
        assert!(white.last_board().is_none());

        assert_eq!(game.put_stone(black.key, 9, 9), Placement::Accepted);
        assert_eq!(game.snapshot().turn, Stone::White);
        assert_eq!(game.put_stone(black.key, 9, 10), Placement::Denied(Denial::WrongTurn));

        assert_eq!(game.put_stone(white.key, 9, 9), Placement::Denied(Denial::Occupied));
        assert_eq!(game.snapshot().turn, Stone::White);
        assert_eq!(game.snapshot().cell(9, 9), Stone::Black);

        assert_eq!(game.put_stone(white.key, 0, 0), Placement::Accepted);
        assert_eq!(game.snapshot().turn, Stone::Black);

        let board = black.last_board().unwrap();
        assert_eq!(board.cell(0, 0), Stone::White);
        assert_eq!(board.status, GameStatus::InProgress);
        assert_eq!(white.last_board(), Some(board));
    }

    #[test]
    fn test_out_of_range_denied() {
        let (game, _sink, mut black, _white) = started_game();
        black.inbox.drain();
        let before = game.snapshot();

        assert_eq!(game.put_stone(black.key, 19, 0), Placement::Denied(Denial::OutOfRange));
        assert_eq!(game.put_stone(black.key, 0, u32::MAX), Placement::Denied(Denial::OutOfRange));
        assert_eq!(game.snapshot(), before);
        assert!(black.last_board().is_none());
    }

    #[test]
    fn test_placement_before_start_denied() {
        let sink = Arc::new(MemorySink::default());
        let game = GameSession::new(ResultDispatcher::new(sink));
        let (black_seat, black) = seat(1, "alice", 1000);
        game.player_enter(black_seat);
        assert_eq!(game.put_stone(black.key, 3, 3), Placement::Denied(Denial::NotInProgress));
        assert_eq!(game.snapshot().cell(3, 3), Stone::Empty);
    }

    #[test]
    fn test_stranger_denied() {
        let (game, _sink, _black, _white) = started_game();
        assert_eq!(game.put_stone(ConnectionId(99), 3, 3), Placement::Denied(Denial::NotSeated));
    }

    #[tokio::test]
    async fn test_five_in_a_row_finishes_game() {
        let (game, sink, mut black, mut white) = started_game();
        for step in 0..4 {
            assert_eq!(game.put_stone(black.key, 9, 9 + step), Placement::Accepted);
            assert_eq!(game.put_stone(white.key, 0, step), Placement::Accepted);
        }
        assert_eq!(game.put_stone(black.key, 9, 13), Placement::Won);
        assert_eq!(game.status(), GameStatus::BlackWins);

        let board = black.last_board().unwrap();
        assert_eq!(board.status, GameStatus::BlackWins);
        assert_eq!(board.turn, Stone::White);
        assert_eq!(white.last_board(), Some(board));

        // Inert afterwards.
        assert_eq!(game.put_stone(white.key, 1, 1), Placement::Denied(Denial::NotInProgress));
        assert!(!game.player_leave(white.key));
        assert_eq!(game.status(), GameStatus::BlackWins);

        let records = sink.wait_for(2).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].player_name, "alice");
        assert_eq!((records[0].rating_delta, records[0].win_delta, records[0].lose_delta), (50, 1, 0));
        assert_eq!(records[1].player_name, "bob");
        assert_eq!((records[1].rating_delta, records[1].win_delta, records[1].lose_delta), (-50, 0, 1));
    }

    #[tokio::test]
    async fn test_leave_during_game_is_forfeit() {
        let (game, sink, black, mut white) = started_game();
        game.put_stone(black.key, 4, 4);

        assert!(game.player_leave(black.key));
        assert_eq!(game.status(), GameStatus::WhiteWins);
        assert_eq!(white.last_board().unwrap().status, GameStatus::WhiteWins);

        let records = sink.wait_for(2).await;
        assert_eq!((records[0].win_delta, records[0].lose_delta), (0, 1));
        assert_eq!((records[1].win_delta, records[1].lose_delta), (1, 0));
        assert_eq!(records[1].rating_delta, 50);
    }

    #[tokio::test]
    async fn test_flush_delivers_forfeit_result() {
        let (game, sink, black, _white) = started_game();
        assert!(game.player_leave(black.key));
        game.flush_results().await;
        let records = sink.records.lock().unwrap().clone();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].win_delta, 1);
    }

    #[test]
    fn test_leave_before_start_is_no_op() {
        let sink = Arc::new(MemorySink::default());
        let game = GameSession::new(ResultDispatcher::new(sink));
        let (black_seat, black) = seat(1, "alice", 1000);
        game.player_enter(black_seat);
        assert!(!game.player_leave(black.key));
        assert_eq!(game.status(), GameStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_concurrent_placements_on_same_cell() {
        let (game, _sink, black, _white) = started_game();
        let game = Arc::new(game);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let game = game.clone();
            let key = black.key;
            tasks.push(tokio::task::spawn_blocking(move || game.put_stone(key, 5, 5)));
        }
        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap() == Placement::Accepted {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(game.snapshot().turn, Stone::White);
        assert_eq!(game.summary().stones, 1);
    }

    #[test]
    fn test_full_queue_disconnects_seat() {
        let (game, _sink, black, mut white) = started_game();
        white.inbox.drain();
        for _ in 0..protocol::CHANNEL_BUFFER_SIZE {
            assert!(white.connection.post_send(bytes::Bytes::new()));
        }

        assert_eq!(game.put_stone(black.key, 9, 9), Placement::Accepted);
        assert_eq!(
            white.inbox.requested_disconnect(),
            Some(DisconnectReason::SendBufferError)
        );
        assert_eq!(black.inbox.requested_disconnect(), None);
    }
}

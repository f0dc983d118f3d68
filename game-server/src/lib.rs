//! Session server for one game of gomoku between two TCP clients.
//!
//! The process hosts exactly one game. It accepts two connections, seats the first player to
//! send a valid START as black and the second as white, arbitrates the stones they place and
//! reports the result once a player completes five in a row or leaves a running game.

pub mod acceptor;
pub mod admin;
pub mod authority;
pub mod board;
pub mod config;
pub mod connection;
pub mod error;
pub mod game_session;
pub mod host;
pub mod player_session;
pub mod rating;
pub mod results;

//! Shared snapshot types and the realtime frame protocol spoken between the
//! two-player minesweeper server and its clients.

pub mod models;
pub mod protocol;

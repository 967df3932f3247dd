use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One square of the board as the server last reported it.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub row: usize,
    pub column: usize,
    pub mine: bool,
    pub revealed: bool,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub adjacent_mines: u8,
}

impl Cell {
    /// Single-character rendering used by text frontends
    pub fn glyph(&self) -> char {
        match (self.revealed, self.mine, self.adjacent_mines) {
            (false, _, _) if self.flagged => 'F',
            (false, _, _) => '·',
            (true, true, _) => '*',
            (true, false, 0) => ' ',
            (true, false, n) => char::from_digit(u32::from(n.min(8)), 10).unwrap_or('?'),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Player {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub score: i64,
}

/// Full game snapshot. Every push from the server replaces the previous one.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub rows: usize,
    pub columns: usize,
    pub mine_count: i64,
    #[serde(default)]
    pub game_over: bool,
    #[serde(default)]
    pub current_turn: Option<String>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub board: Vec<Vec<Cell>>,
}

impl Game {
    /// Get the cell at the given position, if it is on the board
    pub fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        if row < self.rows && column < self.columns {
            self.board.get(row)?.get(column)
        } else {
            None
        }
    }

    /// Iterate over every cell, row by row
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.board.iter().flatten()
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_by_username(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }

    /// A game someone created and is still waiting in for an opponent
    pub fn is_joinable(&self) -> bool {
        self.players.len() == 1 && !self.game_over
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsError {
    #[error("Board dimensions must be between {min} and {max}", min = GameParams::MIN_SIDE, max = GameParams::MAX_SIDE)]
    InvalidDimensions,
    #[error("Mine count must be between 1 and {max}")]
    InvalidMineCount { max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameParams {
    pub rows: usize,
    pub columns: usize,
    pub mine_count: usize,
}

impl GameParams {
    pub const MIN_SIDE: usize = 4;
    pub const MAX_SIDE: usize = 16;

    /// At most a third of the board may be mined
    pub fn max_mines(&self) -> usize {
        self.rows * self.columns / 3
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        let sides = Self::MIN_SIDE..=Self::MAX_SIDE;
        if !sides.contains(&self.rows) || !sides.contains(&self.columns) {
            return Err(ParamsError::InvalidDimensions);
        }

        let max = self.max_mines();
        if self.mine_count == 0 || self.mine_count > max {
            return Err(ParamsError::InvalidMineCount { max });
        }

        Ok(())
    }
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            rows: 8,
            columns: 8,
            mine_count: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub player_id: String,
    pub row: usize,
    pub col: usize,
}

//! Facts derived from a snapshot and the local player. Nothing here is
//! stored; every value is recomputed from the latest snapshot.

use minesduel_common::models::{Game, Player};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fewer than two players have joined
    Waiting,
    Active,
    /// Game over, whatever the player count
    Finished,
}

/// Headline status a frontend shows above the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnIndicator {
    Won,
    Lost,
    WaitingForOpponent,
    YourTurn,
    OpponentsTurn,
}

/// Why a move was refused locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    Waiting,
    Finished,
    NoLocalPlayer,
    NotYourTurn,
    OutOfBounds,
    AlreadyRevealed,
}

pub fn phase(game: &Game) -> Phase {
    if game.game_over {
        Phase::Finished
    } else if game.players.len() < 2 {
        Phase::Waiting
    } else {
        Phase::Active
    }
}

pub fn is_local_players_turn(game: &Game, local: Option<&Player>) -> bool {
    match local {
        Some(player) => {
            !game.game_over && game.current_turn.as_deref() == Some(player.id.as_str())
        }
        None => false,
    }
}

/// Highest scorer of a finished game. Among equal scores the player who
/// joined first wins.
pub fn winner(game: &Game) -> Option<&Player> {
    if phase(game) != Phase::Finished {
        return None;
    }
    game.players
        .iter()
        .reduce(|best, p| if p.score > best.score { p } else { best })
}

pub fn is_local_player_winner(game: &Game, local: Option<&Player>) -> bool {
    match (winner(game), local) {
        (Some(winner), Some(local)) => winner.id == local.id,
        _ => false,
    }
}

/// Mines not yet blown up. Not clamped: a server that reveals more mines than
/// it declared yields a negative count.
pub fn remaining_mines(game: &Game) -> i64 {
    let revealed = game.cells().filter(|c| c.revealed && c.mine).count();
    game.mine_count - revealed as i64
}

/// Check whether the local player may reveal the given cell right now.
/// Flagged cells may still be revealed.
pub fn check_move(
    game: &Game,
    local: Option<&Player>,
    row: usize,
    col: usize,
) -> Result<(), Ineligible> {
    match phase(game) {
        Phase::Waiting => return Err(Ineligible::Waiting),
        Phase::Finished => return Err(Ineligible::Finished),
        Phase::Active => {}
    }
    if local.is_none() {
        return Err(Ineligible::NoLocalPlayer);
    }
    if !is_local_players_turn(game, local) {
        return Err(Ineligible::NotYourTurn);
    }
    match game.cell(row, col) {
        None => Err(Ineligible::OutOfBounds),
        Some(cell) if cell.revealed => Err(Ineligible::AlreadyRevealed),
        Some(_) => Ok(()),
    }
}

pub fn is_move_eligible(game: &Game, local: Option<&Player>, row: usize, col: usize) -> bool {
    check_move(game, local, row, col).is_ok()
}

pub fn turn_indicator(game: &Game, local: Option<&Player>) -> TurnIndicator {
    match phase(game) {
        Phase::Finished if is_local_player_winner(game, local) => TurnIndicator::Won,
        Phase::Finished => TurnIndicator::Lost,
        Phase::Waiting => TurnIndicator::WaitingForOpponent,
        Phase::Active if is_local_players_turn(game, local) => TurnIndicator::YourTurn,
        Phase::Active => TurnIndicator::OpponentsTurn,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub player: Player,
    pub is_local: bool,
    /// Holds the turn; only while the game is running
    pub is_turn_holder: bool,
    /// Only once the game is finished
    pub is_winner: bool,
}

/// Scoreboard rows in join order
pub fn standings(game: &Game, local: Option<&Player>) -> Vec<Standing> {
    let finished = phase(game) == Phase::Finished;
    let winner_id = winner(game).map(|w| w.id.as_str());

    game.players
        .iter()
        .map(|p| Standing {
            player: p.clone(),
            is_local: local.is_some_and(|l| l.id == p.id),
            is_turn_holder: !finished && game.current_turn.as_deref() == Some(p.id.as_str()),
            is_winner: finished && winner_id == Some(p.id.as_str()),
        })
        .collect()
}

/// Everything a frontend needs to draw the status area, computed in one go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnView {
    pub game_id: String,
    pub phase: Phase,
    pub indicator: TurnIndicator,
    pub is_my_turn: bool,
    pub winner: Option<Player>,
    pub i_won: bool,
    pub remaining_mines: i64,
    pub standings: Vec<Standing>,
}

impl TurnView {
    pub fn new(game: &Game, local: Option<&Player>) -> Self {
        Self {
            game_id: game.id.clone(),
            phase: phase(game),
            indicator: turn_indicator(game, local),
            is_my_turn: is_local_players_turn(game, local),
            winner: winner(game).cloned(),
            i_won: is_local_player_winner(game, local),
            remaining_mines: remaining_mines(game),
            standings: standings(game, local),
        }
    }
}

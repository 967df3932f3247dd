use minesduel_common::models::{Game, Player};
use tracing::{debug, info, warn};

/// What happened when a pushed snapshot was offered to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Snapshot applied and the local player was found in it
    Applied,
    /// Snapshot applied but the local player is no longer listed
    AppliedWithoutPlayer,
    /// Snapshot belongs to another game and was dropped
    ForeignGame,
    /// No session is open
    NoSession,
}

#[derive(Debug, Clone)]
struct Session {
    game: Game,
    player: Option<Player>,
    /// Id of the player this client plays as; survives snapshots that
    /// temporarily omit it
    player_id: Option<String>,
}

/// Holds the latest snapshot of the open game together with the local
/// player's identity. Performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct GameSession {
    session: Option<Session>,
}

impl GameSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session on `game`, playing as `username`.
    ///
    /// If no player of that name is in the snapshot the session still opens,
    /// just without a local player.
    pub fn start(&mut self, game: Game, username: &str) {
        let player = game.player_by_username(username).cloned();
        match &player {
            Some(player) => info!(
                "Session started in game {} as {} ({})",
                game.id, player.username, player.id
            ),
            None => warn!(
                "Session started in game {} but no player is named {}",
                game.id, username
            ),
        }

        self.session = Some(Session {
            player_id: player.as_ref().map(|p| p.id.clone()),
            player,
            game,
        });
    }

    /// Replace the held snapshot with a newer one of the same game and
    /// re-resolve the local player by id.
    pub fn reconcile(&mut self, game: Game) -> Reconciled {
        let Some(session) = self.session.as_mut() else {
            debug!("Dropping snapshot for game {}: no open session", game.id);
            return Reconciled::NoSession;
        };

        if session.game.id != game.id {
            warn!(
                "Dropping snapshot for game {} while playing {}",
                game.id, session.game.id
            );
            return Reconciled::ForeignGame;
        }

        session.player = session
            .player_id
            .as_deref()
            .and_then(|id| game.player(id))
            .cloned();
        session.game = game;

        match (&session.player, &session.player_id) {
            (Some(_), _) => Reconciled::Applied,
            (None, Some(id)) => {
                warn!(
                    "Player {} missing from snapshot of game {}",
                    id, session.game.id
                );
                Reconciled::AppliedWithoutPlayer
            }
            (None, None) => Reconciled::AppliedWithoutPlayer,
        }
    }

    /// Clear the game and the local identity
    pub fn end(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Session in game {} ended", session.game.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn game(&self) -> Option<&Game> {
        self.session.as_ref().map(|s| &s.game)
    }

    /// Local player as of the latest snapshot
    pub fn player(&self) -> Option<&Player> {
        self.session.as_ref()?.player.as_ref()
    }

    pub fn game_id(&self) -> Option<&str> {
        self.game().map(|g| g.id.as_str())
    }
}

use minesduel_common::models::{Game, GameParams};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    ClientConfig, ConnectionStatus, MinesweeperClient, Result, SubscriptionManager,
    derive::TurnView,
    gate::{self, MoveOutcome},
    session::{GameSession, Reconciled},
};

/// A pushed snapshot after it has been folded into the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    pub reconciled: Reconciled,
    pub view: TurnView,
}

/// High-level client for one player taking part in one game at a time.
///
/// Owns the session store and is its only writer: snapshots pushed by the
/// subscription are queued and applied when [`next_update`](Self::next_update)
/// is awaited.
pub struct DuelGame {
    client: MinesweeperClient,
    subscriptions: SubscriptionManager,
    session: GameSession,
    snapshots: Option<mpsc::UnboundedReceiver<Game>>,
    last_error: Option<String>,
}

impl DuelGame {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = MinesweeperClient::new(&config.server_url)?;
        let subscriptions = SubscriptionManager::new(client.websocket_url()?, &config);
        Ok(Self {
            client,
            subscriptions,
            session: GameSession::new(),
            snapshots: None,
            last_error: None,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn client(&self) -> &MinesweeperClient {
        &self.client
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Games waiting for a second player
    pub async fn open_games(&self) -> Result<Vec<Game>> {
        self.client.open_games().await
    }

    /// Create a game, join it as `username` and start following it
    pub async fn create_and_join(
        &mut self,
        params: GameParams,
        username: &str,
    ) -> Result<TurnView> {
        let created = self.client.create_game(params).await?;
        self.join(&created.id, username).await
    }

    /// Join an existing game as `username` and start following it
    pub async fn join(&mut self, game_id: &str, username: &str) -> Result<TurnView> {
        let game = self.client.join_game(game_id, username).await?;
        Ok(self.enter(game, username.trim()))
    }

    /// Start a session on a snapshot the caller already holds and subscribe
    /// to its updates. Replaces any session in progress.
    pub fn enter(&mut self, game: Game, username: &str) -> TurnView {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscriptions.open(&game.id, move |snapshot| {
            let _ = sender.send(snapshot);
        });
        self.snapshots = Some(receiver);

        let view = TurnView::new(&game, game.player_by_username(username));
        self.session.start(game, username);
        self.last_error = None;
        view
    }

    /// Wait for the next snapshot of the current game and apply it.
    ///
    /// Returns `None` once there is no subscription to wait on.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            let game = self.snapshots.as_mut()?.recv().await?;
            if let Some(update) = self.fold(game) {
                return Some(update);
            }
        }
    }

    /// Apply a snapshot obtained outside the subscription
    pub fn apply_snapshot(&mut self, game: Game) -> Option<SessionUpdate> {
        self.fold(game)
    }

    fn fold(&mut self, game: Game) -> Option<SessionUpdate> {
        let reconciled = self.session.reconcile(game);
        match reconciled {
            Reconciled::Applied | Reconciled::AppliedWithoutPlayer => self
                .view()
                .map(|view| SessionUpdate { reconciled, view }),
            Reconciled::ForeignGame | Reconciled::NoSession => {
                debug!("Snapshot not applied: {:?}", reconciled);
                None
            }
        }
    }

    /// Derived state of the current session
    pub fn view(&self) -> Option<TurnView> {
        self.session
            .game()
            .map(|game| TurnView::new(game, self.session.player()))
    }

    /// Reveal a cell if it is the local player's turn.
    ///
    /// A failed submission is also kept as [`last_error`](Self::last_error)
    /// until dismissed.
    pub async fn attempt_move(&mut self, row: usize, col: usize) -> Result<MoveOutcome> {
        let result = gate::attempt_move(&self.session, &self.client, row, col).await;
        if let Err(e) = &result {
            warn!("Move at ({}, {}) failed: {}", row, col, e);
            self.last_error = Some(e.to_string());
        }
        result
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Status of the realtime subscription. Release any `borrow()` of the
    /// receiver before calling [`exit`](Self::exit).
    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.subscriptions.watch_status()
    }

    /// Leave the current game: stop the subscription and forget the session
    pub fn exit(&mut self) {
        self.subscriptions.close();
        self.snapshots = None;
        if self.session.is_active() {
            info!("Leaving game {}", self.session.game_id().unwrap_or_default());
        }
        self.session.end();
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        derive::{Ineligible, Phase, TurnIndicator},
        session::tests::{game, player},
    };

    fn offline() -> DuelGame {
        // Nothing listens on the discard port, so every network call fails
        let config =
            ClientConfig::new("http://127.0.0.1:9").with_reconnect_delay(Duration::from_secs(60));
        DuelGame::new(config).unwrap()
    }

    fn two_players(turn: &str) -> Game {
        game("g1", vec![player("p1", "alice", 0), player("p2", "bob", 0)], turn)
    }

    #[tokio::test]
    async fn enter_derives_view() {
        let mut duel = offline();
        let view = duel.enter(two_players("p1"), "alice");
        assert_eq!(view.phase, Phase::Active);
        assert_eq!(view.indicator, TurnIndicator::YourTurn);
        assert_eq!(view.remaining_mines, 2);
        assert_eq!(duel.session().player().unwrap().id, "p1");
    }

    #[tokio::test]
    async fn later_snapshot_wins() {
        let mut duel = offline();
        duel.enter(two_players("p1"), "alice");

        let (sender, receiver) = mpsc::unbounded_channel();
        duel.snapshots = Some(receiver);
        sender.send(two_players("p1")).unwrap();
        sender.send(two_players("p2")).unwrap();

        let first = duel.next_update().await.unwrap();
        assert!(first.view.is_my_turn);
        let second = duel.next_update().await.unwrap();
        assert!(!second.view.is_my_turn);
        assert_eq!(second.view.indicator, TurnIndicator::OpponentsTurn);
        assert!(!duel.view().unwrap().is_my_turn);
    }

    #[tokio::test]
    async fn foreign_snapshots_are_skipped() {
        let mut duel = offline();
        duel.enter(two_players("p1"), "alice");

        let (sender, receiver) = mpsc::unbounded_channel();
        duel.snapshots = Some(receiver);
        sender.send(game("other", vec![], "p9")).unwrap();
        sender.send(two_players("p2")).unwrap();

        let update = duel.next_update().await.unwrap();
        assert_eq!(update.view.game_id, "g1");
        assert_eq!(update.reconciled, Reconciled::Applied);
    }

    #[tokio::test]
    async fn missing_player_blocks_moves() {
        let mut duel = offline();
        duel.enter(two_players("p1"), "alice");

        let update = duel
            .apply_snapshot(game("g1", vec![player("p2", "bob", 1)], "p1"))
            .unwrap();
        assert_eq!(update.reconciled, Reconciled::AppliedWithoutPlayer);

        duel.apply_snapshot(game(
            "g1",
            vec![player("p2", "bob", 1), player("p3", "carol", 0)],
            "p1",
        ));
        let outcome = duel.attempt_move(0, 0).await.unwrap();
        assert_eq!(outcome, MoveOutcome::Ignored(Ineligible::NoLocalPlayer));
    }

    #[tokio::test]
    async fn failed_submission_is_dismissable() {
        let mut duel = offline();
        duel.enter(two_players("p1"), "alice");

        assert!(duel.attempt_move(0, 0).await.is_err());
        assert!(duel.last_error().is_some());
        assert_eq!(duel.view().unwrap().phase, Phase::Active);

        duel.dismiss_error();
        assert!(duel.last_error().is_none());
    }

    #[tokio::test]
    async fn exit_stops_everything() {
        let mut duel = offline();
        duel.enter(two_players("p1"), "alice");
        duel.exit();

        assert!(duel.view().is_none());
        assert!(duel.next_update().await.is_none());
        assert_eq!(*duel.connection_status().borrow(), ConnectionStatus::Closed);
        assert!(duel.apply_snapshot(two_players("p2")).is_none());
        duel.exit();
    }
}

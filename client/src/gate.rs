use std::future::Future;

use tracing::debug;

use crate::{
    Error, Result,
    derive::{Ineligible, check_move},
    session::GameSession,
};

/// Anything that can forward a reveal to the server.
///
/// The result of the move is not read back: the new state arrives as a
/// pushed snapshot.
pub trait MoveSubmitter {
    fn submit_move(
        &self,
        game_id: &str,
        player_id: &str,
        row: usize,
        col: usize,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Forwarded to the server
    Submitted,
    /// Dropped locally, nothing was sent
    Ignored(Ineligible),
}

/// Forward a reveal at (`row`, `col`) if the session allows it.
///
/// Ineligible moves are not errors; they come back as
/// [`MoveOutcome::Ignored`]. An error means the submission itself failed.
/// No local state is touched either way.
pub async fn attempt_move<S: MoveSubmitter>(
    session: &GameSession,
    submitter: &S,
    row: usize,
    col: usize,
) -> Result<MoveOutcome> {
    let game = session.game().ok_or(Error::NoSession)?;
    let player = session.player();

    if let Err(reason) = check_move(game, player, row, col) {
        debug!("Ignoring move at ({}, {}): {:?}", row, col, reason);
        return Ok(MoveOutcome::Ignored(reason));
    }

    // check_move only passes with a local player
    let Some(player) = player else {
        return Ok(MoveOutcome::Ignored(Ineligible::NoLocalPlayer));
    };

    debug!("Submitting move at ({}, {}) in game {}", row, col, game.id);
    submitter.submit_move(&game.id, &player.id, row, col).await?;
    Ok(MoveOutcome::Submitted)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use reqwest::StatusCode;

    use super::*;
    use crate::session::tests::{game, player};

    /// Records every submitted move; fails them all when `fail` is set
    #[derive(Default, Clone)]
    pub(crate) struct RecordingSubmitter {
        pub(crate) moves: Arc<Mutex<Vec<(String, String, usize, usize)>>>,
        pub(crate) fail: bool,
    }

    impl MoveSubmitter for RecordingSubmitter {
        async fn submit_move(
            &self,
            game_id: &str,
            player_id: &str,
            row: usize,
            col: usize,
        ) -> Result<()> {
            self.moves.lock().unwrap().push((
                game_id.to_string(),
                player_id.to_string(),
                row,
                col,
            ));
            if self.fail {
                Err(Error::Status {
                    status: StatusCode::BAD_REQUEST,
                    context: "make move",
                })
            } else {
                Ok(())
            }
        }
    }

    fn active_session(local: &str) -> GameSession {
        let mut session = GameSession::new();
        session.start(
            game("g1", vec![player("p1", "alice", 0), player("p2", "bob", 0)], "p1"),
            local,
        );
        session
    }

    #[tokio::test]
    async fn forwards_eligible_move() {
        let submitter = RecordingSubmitter::default();
        let outcome = attempt_move(&active_session("alice"), &submitter, 2, 3)
            .await
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Submitted);
        assert_eq!(
            *submitter.moves.lock().unwrap(),
            vec![("g1".to_string(), "p1".to_string(), 2, 3)]
        );
    }

    #[tokio::test]
    async fn drops_out_of_turn_move() {
        let submitter = RecordingSubmitter::default();
        let outcome = attempt_move(&active_session("bob"), &submitter, 0, 0)
            .await
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Ignored(Ineligible::NotYourTurn));
        assert!(submitter.moves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn drops_move_on_revealed_cell_and_finished_game() {
        let submitter = RecordingSubmitter::default();
        let mut session = active_session("alice");

        let mut snapshot = session.game().unwrap().clone();
        snapshot.board[0][0].revealed = true;
        session.reconcile(snapshot.clone());
        let outcome = attempt_move(&session, &submitter, 0, 0).await.unwrap();
        assert_eq!(outcome, MoveOutcome::Ignored(Ineligible::AlreadyRevealed));

        snapshot.game_over = true;
        session.reconcile(snapshot);
        let outcome = attempt_move(&session, &submitter, 1, 1).await.unwrap();
        assert_eq!(outcome, MoveOutcome::Ignored(Ineligible::Finished));

        assert!(submitter.moves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submission_failure_leaves_session_untouched() {
        let submitter = RecordingSubmitter {
            fail: true,
            ..Default::default()
        };
        let session = active_session("alice");
        let before = session.game().cloned();

        let err = attempt_move(&session, &submitter, 1, 1).await.unwrap_err();
        assert!(matches!(err, Error::Status { .. }));
        assert_eq!(session.game().cloned(), before);
        assert_eq!(submitter.moves.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_session_is_an_error() {
        let submitter = RecordingSubmitter::default();
        let err = attempt_move(&GameSession::new(), &submitter, 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSession));
    }
}

use minesduel_common::models::{Game, GameParams, JoinRequest, MoveRequest};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::{Error, MoveSubmitter, Result};

const GAMES_PATH: &str = "/api/games";
const WEBSOCKET_PATH: &str = "/ws";

/// HTTP client for the game server's REST API
#[derive(Debug, Clone)]
pub struct MinesweeperClient {
    client: Client,
    base_url: Url,
}

impl MinesweeperClient {
    /// Create a new client connecting to the specified server URL
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::new();

        Ok(Self { client, base_url })
    }

    fn games_url(&self, suffix: &str) -> Result<Url> {
        Ok(self.base_url.join(&format!("{GAMES_PATH}{suffix}"))?)
    }

    async fn parse<T: DeserializeOwned>(response: Response, context: &'static str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status { status, context });
        }
        Ok(response.json().await?)
    }

    /// Every game the server knows about
    pub async fn list_games(&self) -> Result<Vec<Game>> {
        let response = self.client.get(self.games_url("")?).send().await?;
        Self::parse(response, "list games").await
    }

    /// Games with a single waiting player that can still be joined
    pub async fn open_games(&self) -> Result<Vec<Game>> {
        let mut games = self.list_games().await?;
        games.retain(Game::is_joinable);
        debug!("{} open games", games.len());
        Ok(games)
    }

    pub async fn get_game(&self, game_id: &str) -> Result<Game> {
        let response = self
            .client
            .get(self.games_url(&format!("/{game_id}"))?)
            .send()
            .await?;
        Self::parse(response, "fetch game").await
    }

    /// Create a new game. The creator still has to join it.
    pub async fn create_game(&self, params: GameParams) -> Result<Game> {
        params.validate()?;

        let response = self
            .client
            .post(self.games_url("")?)
            .json(&params)
            .send()
            .await?;
        let game: Game = Self::parse(response, "create game").await?;

        info!(
            "Created game {}: {}x{} with {} mines",
            game.id, game.rows, game.columns, game.mine_count
        );
        Ok(game)
    }

    pub async fn join_game(&self, game_id: &str, username: &str) -> Result<Game> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::EmptyUsername);
        }

        let response = self
            .client
            .post(self.games_url(&format!("/{game_id}/join"))?)
            .json(&JoinRequest {
                username: username.to_string(),
            })
            .send()
            .await?;
        let game: Game = Self::parse(response, "join game").await?;

        info!("Joined game {} as {}", game.id, username);
        Ok(game)
    }

    /// Submit a reveal. The returned snapshot mirrors what the realtime
    /// channel will push.
    pub async fn make_move(
        &self,
        game_id: &str,
        player_id: &str,
        row: usize,
        col: usize,
    ) -> Result<Game> {
        let response = self
            .client
            .post(self.games_url(&format!("/{game_id}/move"))?)
            .json(&MoveRequest {
                player_id: player_id.to_string(),
                row,
                col,
            })
            .send()
            .await?;
        Self::parse(response, "make move").await
    }

    /// Get the realtime endpoint matching this server
    pub fn websocket_url(&self) -> Result<String> {
        let mut ws_url = self.base_url.clone();
        ws_url
            .set_scheme(match self.base_url.scheme() {
                "https" => "wss",
                _ => "ws",
            })
            .map_err(|_| Error::WebSocketScheme)?;
        ws_url.set_path(WEBSOCKET_PATH);
        ws_url.set_query(None);

        Ok(ws_url.to_string())
    }
}

impl MoveSubmitter for MinesweeperClient {
    async fn submit_move(
        &self,
        game_id: &str,
        player_id: &str,
        row: usize,
        col: usize,
    ) -> Result<()> {
        self.make_move(game_id, player_id, row, col).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_follows_scheme() {
        let client = MinesweeperClient::new("http://localhost:8080").unwrap();
        assert_eq!(client.websocket_url().unwrap(), "ws://localhost:8080/ws");

        let client = MinesweeperClient::new("https://mines.example/app?x=1").unwrap();
        assert_eq!(client.websocket_url().unwrap(), "wss://mines.example/ws");
    }

    #[test]
    fn rest_paths() {
        let client = MinesweeperClient::new("http://localhost:8080").unwrap();
        assert_eq!(
            client.games_url("/g1/move").unwrap().as_str(),
            "http://localhost:8080/api/games/g1/move"
        );
        assert_eq!(
            client.games_url("").unwrap().as_str(),
            "http://localhost:8080/api/games"
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(
            MinesweeperClient::new("not a url"),
            Err(Error::Url(_))
        ));
    }

    #[tokio::test]
    async fn validates_before_any_request() {
        // Nothing listens on port 9; a network attempt would fail differently
        let client = MinesweeperClient::new("http://127.0.0.1:9").unwrap();

        let err = tokio_test::assert_err!(
            client
                .create_game(GameParams {
                    rows: 2,
                    ..GameParams::default()
                })
                .await
        );
        assert!(matches!(err, Error::InvalidParams(_)));

        let err = tokio_test::assert_err!(client.join_game("g1", "   ").await);
        assert!(matches!(err, Error::EmptyUsername));
    }
}
